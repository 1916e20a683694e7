//! Session store backed by a hosted PostgREST API.
//!
//! Talks to the same three tables as the SQLite store (`active_sessions`,
//! `study_sessions`, `user_streaks`). Timestamp columns are expected to be
//! `timestamptz` so they round-trip as RFC 3339.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use super::records::{
    ActiveSessionPatch, ActiveSessionRecord, CompletedSessionRecord, NewActiveSession,
    NewCompletedSession, StreakRecord,
};
use super::traits::{SessionStore, StreakTracker};
use crate::error::{StoreError, StoreResult};

const ACTIVE_TABLE: &str = "active_sessions";
const COMPLETED_TABLE: &str = "study_sessions";
const STREAK_TABLE: &str = "user_streaks";

#[derive(Serialize)]
struct StreakRow<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    record: &'a StreakRecord,
}

pub struct RestStore {
    client: Client,
    base: Url,
    api_key: String,
    access_token: Option<String>,
}

impl RestStore {
    /// `base_url` is the REST root, e.g. `https://<project>.supabase.co/rest/v1`.
    pub fn new(base_url: &str, api_key: impl Into<String>) -> StoreResult<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base,
            api_key: api_key.into(),
            access_token: None,
        })
    }

    /// Authenticate requests as a signed-in user instead of the anon key.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Most recent completed sessions first.
    pub async fn recent_sessions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<CompletedSessionRecord>> {
        self.select(
            COMPLETED_TABLE,
            &[
                ("select", "*".to_string()),
                ("user_id", eq(user_id)),
                ("order", "end_time.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    fn table_url(&self, table: &str, filters: &[(&str, String)]) -> StoreResult<Url> {
        let mut url = self.base.join(table)?;
        if !filters.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in filters {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let token = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
    }

    async fn send(&self, builder: RequestBuilder) -> StoreResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> StoreResult<Vec<T>> {
        let url = self.table_url(table, filters)?;
        let response = self.send(self.request(Method::GET, url)).await?;
        Ok(response.json().await?)
    }

    /// Insert one row and return it as stored.
    async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
    ) -> StoreResult<T> {
        let url = self.table_url(table, &[])?;
        let builder = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(body);
        let mut rows: Vec<T> = self.send(builder).await?.json().await?;
        if rows.is_empty() {
            return Err(StoreError::Corrupt(format!("insert into {table} returned no row")));
        }
        Ok(rows.swap_remove(0))
    }

    async fn patch<B: Serialize + ?Sized>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: &B,
    ) -> StoreResult<()> {
        let url = self.table_url(table, filters)?;
        self.send(self.request(Method::PATCH, url).json(body)).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, filters: &[(&str, String)]) -> StoreResult<()> {
        let url = self.table_url(table, filters)?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl SessionStore for RestStore {
    async fn list_active(&self, user_id: &str) -> StoreResult<Vec<ActiveSessionRecord>> {
        self.select(
            ACTIVE_TABLE,
            &[
                ("select", "*".to_string()),
                ("user_id", eq(user_id)),
                ("order", "last_updated.desc".to_string()),
            ],
        )
        .await
    }

    async fn create_active(&self, record: NewActiveSession) -> StoreResult<ActiveSessionRecord> {
        self.insert(ACTIVE_TABLE, &record).await
    }

    async fn update_active(&self, id: &str, patch: &ActiveSessionPatch) -> StoreResult<()> {
        self.patch(ACTIVE_TABLE, &[("id", eq(id))], patch).await
    }

    async fn delete_active(&self, id: &str) -> StoreResult<()> {
        self.delete(ACTIVE_TABLE, &[("id", eq(id))]).await
    }

    async fn delete_active_for_user(&self, user_id: &str) -> StoreResult<()> {
        self.delete(ACTIVE_TABLE, &[("user_id", eq(user_id))]).await
    }

    async fn create_completed(
        &self,
        record: NewCompletedSession,
    ) -> StoreResult<CompletedSessionRecord> {
        self.insert(COMPLETED_TABLE, &record).await
    }
}

#[async_trait]
impl StreakTracker for RestStore {
    async fn get(&self, user_id: &str) -> StoreResult<Option<StreakRecord>> {
        let mut rows: Vec<StreakRecord> = self
            .select(
                STREAK_TABLE,
                &[
                    (
                        "select",
                        "current_streak,longest_streak,last_study_date".to_string(),
                    ),
                    ("user_id", eq(user_id)),
                ],
            )
            .await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn create(&self, user_id: &str, record: &StreakRecord) -> StoreResult<()> {
        let url = self.table_url(STREAK_TABLE, &[])?;
        let row = StreakRow { user_id, record };
        self.send(self.request(Method::POST, url).json(&row)).await?;
        Ok(())
    }

    async fn update(&self, user_id: &str, record: &StreakRecord) -> StoreResult<()> {
        self.patch(STREAK_TABLE, &[("user_id", eq(user_id))], record)
            .await
    }
}
