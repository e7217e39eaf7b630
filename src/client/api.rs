//! HTTP access to the comment service.

use std::future::Future;
use std::sync::Arc;

use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::client::ClientConfig;
use crate::client::session::SessionContext;
use crate::engine::target::TargetHandle;
use crate::error::{EngineError, ErrorBody};
use crate::models::{
    AutoModerationResult, BulkModerationResult, Comment, CommentOrdering, CreateComment,
    InteractionOutcome, InteractionType, ModerationAction, ModerationRecord, ModerationStats,
    NotificationList, Page, PageRequest,
};

/// Operations the reconciler needs from the server.
pub trait CommentsApi: Send + Sync + 'static {
    fn list_comments(
        &self,
        target: &TargetHandle,
        page: PageRequest,
        ordering: CommentOrdering,
    ) -> impl Future<Output = Result<Page<Comment>, EngineError>> + Send;

    fn create_comment(
        &self,
        input: &CreateComment,
    ) -> impl Future<Output = Result<Comment, EngineError>> + Send;

    fn update_comment(
        &self,
        comment_id: i64,
        text: &str,
    ) -> impl Future<Output = Result<Comment, EngineError>> + Send;

    fn delete_comment(&self, comment_id: i64) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn interact(
        &self,
        comment_id: i64,
        interaction_type: InteractionType,
        reason: Option<&str>,
    ) -> impl Future<Output = Result<InteractionOutcome, EngineError>> + Send;
}

#[derive(Debug, Clone)]
pub struct ApiClient<S> {
    http: HttpClient,
    base_url: String,
    session: Arc<S>,
}

impl<S: SessionContext> ApiClient<S> {
    pub fn new(config: &ClientConfig, session: Arc<S>) -> Result<Self, EngineError> {
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| EngineError::Unavailable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn attempt<F>(&self, build: &F) -> Result<Response, EngineError>
    where
        F: Fn(&HttpClient) -> RequestBuilder + Sync,
    {
        let mut request = build(&self.http);
        if let Some(token) = self.session.access_token() {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    /// Sends a request, refreshing the session and retrying exactly once on
    /// `401`. A second `401` or a failed refresh is `SessionExpired`.
    async fn execute<F>(&self, build: F) -> Result<Response, EngineError>
    where
        F: Fn(&HttpClient) -> RequestBuilder + Sync,
    {
        let response = self.attempt(&build).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!("Received 401, refreshing session");
        if let Err(error) = self.session.refresh().await {
            tracing::debug!("Session refresh failed: {}", error);
            return Err(EngineError::SessionExpired);
        }

        let retried = self.attempt(&build).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            return Err(EngineError::SessionExpired);
        }
        Ok(retried)
    }

    async fn fetch<T, F>(&self, build: F) -> Result<T, EngineError>
    where
        T: DeserializeOwned,
        F: Fn(&HttpClient) -> RequestBuilder + Sync,
    {
        let response = check(self.execute(build).await?).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| EngineError::Unavailable(format!("malformed response: {}", e)))
    }

    async fn fetch_empty<F>(&self, build: F) -> Result<(), EngineError>
    where
        F: Fn(&HttpClient) -> RequestBuilder + Sync,
    {
        check(self.execute(build).await?).await?;
        Ok(())
    }

    pub async fn get_comment(&self, comment_id: i64) -> Result<Comment, EngineError> {
        let url = self.url(&format!("/comments/{}/", comment_id));
        self.fetch(|http| http.get(&url)).await
    }

    pub async fn list_replies(&self, root_id: i64) -> Result<Vec<Comment>, EngineError> {
        let url = self.url(&format!("/comments/{}/replies/", root_id));
        self.fetch(|http| http.get(&url)).await
    }

    pub async fn moderate(
        &self,
        comment_id: i64,
        action: ModerationAction,
        reason: Option<&str>,
    ) -> Result<Comment, EngineError> {
        let url = self.url(&format!("/comments/{}/moderate/", comment_id));
        let body = json!({"action": action, "reason": reason});
        self.fetch(|http| http.post(&url).json(&body)).await
    }

    pub async fn bulk_moderate(
        &self,
        comment_ids: &[i64],
        action: ModerationAction,
        reason: Option<&str>,
    ) -> Result<BulkModerationResult, EngineError> {
        let url = self.url("/comments/moderation/bulk/");
        let body = json!({"comment_ids": comment_ids, "action": action, "reason": reason});
        self.fetch(|http| http.post(&url).json(&body)).await
    }

    pub async fn auto_moderate(&self) -> Result<AutoModerationResult, EngineError> {
        let url = self.url("/comments/moderation/auto/");
        self.fetch(|http| http.post(&url)).await
    }

    pub async fn hard_delete(&self, comment_id: i64, reason: &str) -> Result<Vec<i64>, EngineError> {
        #[derive(serde::Deserialize)]
        struct Purged {
            deleted_ids: Vec<i64>,
        }

        let url = self.url(&format!("/comments/{}/hard-delete/", comment_id));
        let body = json!({"reason": reason});
        let purged: Purged = self.fetch(|http| http.delete(&url).json(&body)).await?;
        Ok(purged.deleted_ids)
    }

    pub async fn moderation_stats(&self, days: i64) -> Result<ModerationStats, EngineError> {
        let url = self.url("/comments/moderation/stats/");
        self.fetch(|http| http.get(&url).query(&[("days", days)])).await
    }

    pub async fn moderation_history(&self, comment_id: i64) -> Result<Vec<ModerationRecord>, EngineError> {
        let url = self.url(&format!("/comments/{}/history/", comment_id));
        self.fetch(|http| http.get(&url)).await
    }

    pub async fn notifications(&self) -> Result<NotificationList, EngineError> {
        let url = self.url("/notifications/");
        self.fetch(|http| http.get(&url)).await
    }

    pub async fn mark_notification_read(&self, notification_id: i64) -> Result<(), EngineError> {
        let url = self.url(&format!("/notifications/{}/read/", notification_id));
        self.fetch_empty(|http| http.post(&url)).await
    }
}

async fn check(response: Response) -> Result<Response, EngineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.json::<ErrorBody>().await.ok();
    Err(EngineError::from_wire(status.as_u16(), body))
}

impl<S: SessionContext + 'static> CommentsApi for ApiClient<S> {
    async fn list_comments(
        &self,
        target: &TargetHandle,
        page: PageRequest,
        ordering: CommentOrdering,
    ) -> Result<Page<Comment>, EngineError> {
        let url = self.url("/comments/");
        let query = [
            ("content_type", target.content_type().as_str().to_string()),
            ("object_id", target.object_id().to_string()),
            ("page", page.page.to_string()),
            ("page_size", page.page_size.to_string()),
            ("ordering", ordering.as_str().to_string()),
        ];
        self.fetch(|http| http.get(&url).query(&query)).await
    }

    async fn create_comment(&self, input: &CreateComment) -> Result<Comment, EngineError> {
        let url = self.url("/comments/");
        self.fetch(|http| http.post(&url).json(input)).await
    }

    async fn update_comment(&self, comment_id: i64, text: &str) -> Result<Comment, EngineError> {
        let url = self.url(&format!("/comments/{}/", comment_id));
        let body = json!({"text": text});
        self.fetch(|http| http.patch(&url).json(&body)).await
    }

    async fn delete_comment(&self, comment_id: i64) -> Result<(), EngineError> {
        let url = self.url(&format!("/comments/{}/", comment_id));
        self.fetch_empty(|http| http.delete(&url)).await
    }

    async fn interact(
        &self,
        comment_id: i64,
        interaction_type: InteractionType,
        reason: Option<&str>,
    ) -> Result<InteractionOutcome, EngineError> {
        let url = self.url(&format!("/comments/{}/interact/", comment_id));
        let body = json!({"interaction_type": interaction_type, "reason": reason});
        self.fetch(|http| http.post(&url).json(&body)).await
    }
}
