use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_BACKEND_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_CHAT_HISTORY_LIMIT: u32 = 50;

#[derive(Debug, Clone)]
pub struct TaskBackendConfig {
    pub base_url: String,
}

impl TaskBackendConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskBackendClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Error)]
pub enum BackendClientError {
    #[error("backend_invalid_path")]
    InvalidPath,
    #[error("backend_request_failed:{message}")]
    Request { message: String },
    #[error("backend_read_failed:{message}")]
    Read { message: String },
    #[error("backend_json_decode_failed:{message}")]
    Decode { message: String },
}

/// Outcome of one backend call. Non-2xx responses are relay material for the
/// caller, not errors; only transport and decode failures surface as
/// `BackendClientError`.
#[derive(Debug)]
pub enum BackendReply<T> {
    Success { status: StatusCode, payload: T },
    NoContent,
    Upstream {
        status: StatusCode,
        body: Vec<u8>,
        content_type: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageRecord {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub result: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub message: String,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub conversation_id: Option<String>,
    pub messages: Vec<ChatMessageRecord>,
}

impl ConversationHistory {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            conversation_id: None,
            messages: Vec::new(),
        }
    }
}

impl TaskBackendClient {
    #[must_use]
    pub fn new(config: TaskBackendConfig) -> Self {
        Self {
            base_url: normalize_base_url(&config.base_url),
            http: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    #[must_use]
    pub fn tasks_path(user_id: &str) -> String {
        format!("/api/{}/tasks", user_id.trim())
    }

    #[must_use]
    pub fn task_path(user_id: &str, task_id: &str) -> String {
        format!("/api/{}/tasks/{}", user_id.trim(), task_id.trim())
    }

    #[must_use]
    pub fn task_complete_path(user_id: &str, task_id: &str) -> String {
        format!("/api/{}/tasks/{}/complete", user_id.trim(), task_id.trim())
    }

    #[must_use]
    pub fn chat_path(user_id: &str) -> String {
        format!("/api/{}/chat", user_id.trim())
    }

    #[must_use]
    pub fn chat_history_path(user_id: &str, limit: u32) -> String {
        format!("/api/{}/chat/history?limit={limit}", user_id.trim())
    }

    pub async fn list_tasks(
        &self,
        user_id: &str,
        bearer_token: &str,
    ) -> Result<BackendReply<Vec<TaskRecord>>, BackendClientError> {
        self.fetch(Method::GET, Self::tasks_path(user_id).as_str(), bearer_token)
            .await
    }

    pub async fn get_task(
        &self,
        user_id: &str,
        task_id: &str,
        bearer_token: &str,
    ) -> Result<BackendReply<TaskRecord>, BackendClientError> {
        self.fetch(
            Method::GET,
            Self::task_path(user_id, task_id).as_str(),
            bearer_token,
        )
        .await
    }

    pub async fn create_task<Req>(
        &self,
        user_id: &str,
        bearer_token: &str,
        payload: &Req,
    ) -> Result<BackendReply<TaskRecord>, BackendClientError>
    where
        Req: Serialize + ?Sized,
    {
        self.submit(
            Method::POST,
            Self::tasks_path(user_id).as_str(),
            bearer_token,
            payload,
        )
        .await
    }

    pub async fn update_task<Req>(
        &self,
        user_id: &str,
        task_id: &str,
        bearer_token: &str,
        payload: &Req,
    ) -> Result<BackendReply<TaskRecord>, BackendClientError>
    where
        Req: Serialize + ?Sized,
    {
        self.submit(
            Method::PUT,
            Self::task_path(user_id, task_id).as_str(),
            bearer_token,
            payload,
        )
        .await
    }

    pub async fn delete_task(
        &self,
        user_id: &str,
        task_id: &str,
        bearer_token: &str,
    ) -> Result<BackendReply<TaskRecord>, BackendClientError> {
        self.fetch(
            Method::DELETE,
            Self::task_path(user_id, task_id).as_str(),
            bearer_token,
        )
        .await
    }

    // The backend owns the flip semantics; this is a bodiless PATCH against
    // the dedicated sub-path.
    pub async fn toggle_task_complete(
        &self,
        user_id: &str,
        task_id: &str,
        bearer_token: &str,
    ) -> Result<BackendReply<TaskRecord>, BackendClientError> {
        self.fetch(
            Method::PATCH,
            Self::task_complete_path(user_id, task_id).as_str(),
            bearer_token,
        )
        .await
    }

    pub async fn send_chat_message<Req>(
        &self,
        user_id: &str,
        bearer_token: &str,
        payload: &Req,
    ) -> Result<BackendReply<ChatReply>, BackendClientError>
    where
        Req: Serialize + ?Sized,
    {
        self.submit(
            Method::POST,
            Self::chat_path(user_id).as_str(),
            bearer_token,
            payload,
        )
        .await
    }

    pub async fn chat_history(
        &self,
        user_id: &str,
        limit: u32,
        bearer_token: &str,
    ) -> Result<BackendReply<ConversationHistory>, BackendClientError> {
        self.fetch(
            Method::GET,
            Self::chat_history_path(user_id, limit).as_str(),
            bearer_token,
        )
        .await
    }

    // Single attempt per call: the gateway never retries on behalf of the
    // browser.
    async fn fetch<T>(
        &self,
        method: Method,
        path: &str,
        bearer_token: &str,
    ) -> Result<BackendReply<T>, BackendClientError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .prepare(method, path, bearer_token)?
            .send()
            .await
            .map_err(|error| BackendClientError::Request {
                message: error.to_string(),
            })?;
        decode_reply(response).await
    }

    async fn submit<Req, T>(
        &self,
        method: Method,
        path: &str,
        bearer_token: &str,
        payload: &Req,
    ) -> Result<BackendReply<T>, BackendClientError>
    where
        Req: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .prepare(method, path, bearer_token)?
            .json(payload)
            .send()
            .await
            .map_err(|error| BackendClientError::Request {
                message: error.to_string(),
            })?;
        decode_reply(response).await
    }

    fn prepare(
        &self,
        method: Method,
        path: &str,
        bearer_token: &str,
    ) -> Result<reqwest::RequestBuilder, BackendClientError> {
        let url = self.endpoint(path).ok_or(BackendClientError::InvalidPath)?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(bearer_token)
            .header("x-request-id", format!("req_{}", Uuid::new_v4().simple())))
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return DEFAULT_BACKEND_BASE_URL.to_string();
    }
    trimmed.trim_end_matches('/').to_string()
}

async fn decode_reply<T>(response: reqwest::Response) -> Result<BackendReply<T>, BackendClientError>
where
    T: DeserializeOwned,
{
    let status = response.status();

    // 204 carries no body at all; never touch the JSON machinery for it.
    if status == StatusCode::NO_CONTENT {
        return Ok(BackendReply::NoContent);
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());
    let bytes = response
        .bytes()
        .await
        .map_err(|error| BackendClientError::Read {
            message: error.to_string(),
        })?;

    if !status.is_success() {
        return Ok(BackendReply::Upstream {
            status,
            body: bytes.to_vec(),
            content_type,
        });
    }

    let payload =
        serde_json::from_slice::<T>(&bytes).map_err(|error| BackendClientError::Decode {
            message: error.to_string(),
        })?;
    Ok(BackendReply::Success { status, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_builder_normalizes_paths() {
        let client = TaskBackendClient::new(TaskBackendConfig::new("https://tasks.example.com/"));

        assert_eq!(
            client.endpoint("/api/u1/tasks"),
            Some("https://tasks.example.com/api/u1/tasks".to_string())
        );
        assert_eq!(
            client.endpoint("api/u1/tasks"),
            Some("https://tasks.example.com/api/u1/tasks".to_string())
        );
        assert_eq!(client.endpoint(""), None);
        assert_eq!(client.endpoint("   "), None);
    }

    #[test]
    fn blank_base_url_falls_back_to_default() {
        let client = TaskBackendClient::new(TaskBackendConfig::new("   "));
        assert_eq!(client.base_url(), DEFAULT_BACKEND_BASE_URL);
    }

    #[test]
    fn path_helpers_are_deterministic() {
        assert_eq!(TaskBackendClient::tasks_path("u1"), "/api/u1/tasks");
        assert_eq!(TaskBackendClient::task_path("u1", "42"), "/api/u1/tasks/42");
        assert_eq!(
            TaskBackendClient::task_complete_path("u1", "42"),
            "/api/u1/tasks/42/complete"
        );
        assert_eq!(TaskBackendClient::chat_path("u1"), "/api/u1/chat");
        assert_eq!(
            TaskBackendClient::chat_history_path("u1", 50),
            "/api/u1/chat/history?limit=50"
        );
        assert_eq!(
            TaskBackendClient::task_path(" u1 ", " 42 "),
            "/api/u1/tasks/42"
        );
    }

    #[test]
    fn error_display_preserves_shape() {
        let request = BackendClientError::Request {
            message: "connection refused".to_string(),
        };
        assert_eq!(
            request.to_string(),
            "backend_request_failed:connection refused"
        );

        let decode = BackendClientError::Decode {
            message: "missing field `title`".to_string(),
        };
        assert_eq!(
            decode.to_string(),
            "backend_json_decode_failed:missing field `title`"
        );

        assert_eq!(
            BackendClientError::InvalidPath.to_string(),
            "backend_invalid_path"
        );
    }

    #[test]
    fn task_record_decodes_backend_shape() {
        let payload = serde_json::json!({
            "id": 42,
            "title": "Buy milk",
            "description": null,
            "completed": false,
            "owner_id": 7,
            "created_at": "2026-03-01T12:00:00Z",
            "updated_at": "2026-03-01T12:30:00Z"
        });

        let record: TaskRecord = serde_json::from_value(payload).expect("task record");
        assert_eq!(record.id, 42);
        assert_eq!(record.title, "Buy milk");
        assert_eq!(record.description, None);
        assert!(!record.completed);
        assert_eq!(record.owner_id, 7);
    }

    #[test]
    fn chat_reply_tolerates_absent_tool_calls() {
        let bare: ChatReply = serde_json::from_value(serde_json::json!({
            "message": "Added it.",
            "conversation_id": "conv_1"
        }))
        .expect("chat reply");
        assert!(bare.tool_calls.is_none());

        let with_tools: ChatReply = serde_json::from_value(serde_json::json!({
            "message": "Added it.",
            "conversation_id": "conv_1",
            "tool_calls": [{"tool": "create_task", "args": {"title": "Buy milk"}, "result": {"id": 42}}]
        }))
        .expect("chat reply with tools");
        let calls = with_tools.tool_calls.unwrap_or_default();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool, "create_task");

        let reserialized = serde_json::to_value(&bare).expect("encode");
        assert!(reserialized.get("tool_calls").is_none());
    }

    #[test]
    fn conversation_history_decodes_null_conversation() {
        let history: ConversationHistory = serde_json::from_value(serde_json::json!({
            "conversation_id": null,
            "messages": []
        }))
        .expect("history");
        assert_eq!(history.conversation_id, None);
        assert!(history.messages.is_empty());

        let empty = ConversationHistory::empty();
        assert_eq!(empty.conversation_id, None);
        assert!(empty.messages.is_empty());
    }

    #[test]
    fn chat_role_round_trips_lowercase() {
        let message: ChatMessageRecord = serde_json::from_value(serde_json::json!({
            "id": "msg_1",
            "role": "assistant",
            "content": "Done.",
            "created_at": "2026-03-01T12:00:00Z"
        }))
        .expect("chat message");
        assert_eq!(message.role, ChatRole::Assistant);

        let encoded = serde_json::to_value(&message).expect("encode");
        assert_eq!(encoded["role"], "assistant");
    }
}
