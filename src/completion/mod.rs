mod types;

use crate::completion::types::*;
use crate::config::AppConfig;
use crate::error::AppError;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_API_BASE: &str = "https://api.openai.com";
const CHAT_MODEL: &str = "gpt-4.1-mini";
const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed assistant-run poll budget: 30 status checks, 2 seconds apart.
const RUN_POLL_INTERVAL: Duration = Duration::from_secs(2);
const RUN_POLL_ATTEMPTS: u32 = 30;

#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    api_key: String,
    api_base: String,
    assistant_id: Option<String>,
    poll_interval: Duration,
    poll_attempts: u32,
}
impl CompletionClient {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(anyhow::Error::new)?;

        Ok(Self {
            client,
            api_key: config.openai_api_key.clone(),
            api_base: DEFAULT_API_BASE.to_string(),
            assistant_id: config.openai_assistant_id.clone(),
            poll_interval: RUN_POLL_INTERVAL,
            poll_attempts: RUN_POLL_ATTEMPTS,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    #[cfg(test)]
    pub(crate) fn with_poll_schedule(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    /// Generates a reply for a single user message, through either the chat
    /// completions API or an assistant run when one is configured.
    pub async fn get_reply(&self, message: &str) -> Result<String, AppError> {
        match self.assistant_id.as_deref() {
            Some(assistant_id) => self.assistant_reply(assistant_id, message).await,
            None => self.chat_reply(message).await,
        }
    }

    #[instrument(skip(self, message))]
    async fn chat_reply(&self, message: &str) -> Result<String, AppError> {
        let request = ChatCompletionRequest {
            model: CHAT_MODEL,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: message.to_string(),
                },
            ],
        };

        debug!("Requesting chat completion");
        let response: ChatCompletionResponse = self
            .send(
                self.client
                    .post(self.url("/v1/chat/completions"))
                    .json(&request),
            )
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AppError::Completion("No choices in response".to_string()))
    }

    /// Assistant-run mode: thread + message + run, then status polling until
    /// the run leaves its pending state or the budget runs out.
    #[instrument(skip(self, message))]
    async fn assistant_reply(&self, assistant_id: &str, message: &str) -> Result<String, AppError> {
        let thread: ObjectRef = self
            .send(self.assistants(Method::POST, "/v1/threads").json(&serde_json::json!({})))
            .await?;
        debug!("Created thread {}", thread.id);

        let _message: ObjectRef = self
            .send(
                self.assistants(Method::POST, &format!("/v1/threads/{}/messages", thread.id))
                    .json(&CreateMessageRequest {
                        role: "user",
                        content: message,
                    }),
            )
            .await?;

        let run: RunObject = self
            .send(
                self.assistants(Method::POST, &format!("/v1/threads/{}/runs", thread.id))
                    .json(&CreateRunRequest { assistant_id }),
            )
            .await?;
        debug!("Started run {} ({:?})", run.id, run.status);

        for attempt in 1..=self.poll_attempts {
            let state: RunObject = self
                .send(self.assistants(
                    Method::GET,
                    &format!("/v1/threads/{}/runs/{}", thread.id, run.id),
                ))
                .await?;

            match state.status {
                RunStatus::Completed => return self.latest_assistant_text(&thread.id).await,
                status if status.is_pending() => {
                    debug!(
                        "Run {} still {status:?} (check {attempt}/{})",
                        run.id, self.poll_attempts
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
                status => {
                    return Err(AppError::Completion(format!(
                        "Run {} ended with status {status:?}",
                        run.id
                    )))
                }
            }
        }

        Err(AppError::CompletionTimeout(self.poll_attempts))
    }

    async fn latest_assistant_text(&self, thread_id: &str) -> Result<String, AppError> {
        let messages: MessageListResponse = self
            .send(self.assistants(Method::GET, &format!("/v1/threads/{thread_id}/messages")))
            .await?;

        // The list is newest-first, so this is the reply the run produced.
        messages
            .data
            .into_iter()
            .find(|message| message.role == "assistant")
            .and_then(ThreadMessage::into_text)
            .ok_or_else(|| AppError::Completion("Run completed without a text reply".to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Assistant endpoints require the beta opt-in header.
    fn assistants(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, AppError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Completion(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Completion(format!("{status}: {error_text}")));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Completion(format!("Malformed response: {e}")))
    }
}

#[cfg(test)]
mod completion_tests {
    use super::*;
    use std::net::SocketAddr;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> AppConfig {
        AppConfig {
            openai_api_key: "sk-test".to_string(),
            openai_assistant_id: None,
            twilio_account_sid: "AC123".to_string(),
            twilio_auth_token: "token".to_string(),
            whatsapp_from: "+15550006789".to_string(),
            address: SocketAddr::from(([127, 0, 0, 1], 0)),
        }
    }

    fn chat_client(server: &MockServer) -> CompletionClient {
        CompletionClient::new(&test_config())
            .unwrap()
            .with_api_base(server.uri())
    }

    fn assistant_client(server: &MockServer) -> CompletionClient {
        let mut config = test_config();
        config.openai_assistant_id = Some("asst_1".to_string());
        CompletionClient::new(&config)
            .unwrap()
            .with_api_base(server.uri())
            .with_poll_schedule(Duration::from_millis(1), 3)
    }

    async fn mount_assistant_setup(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/threads"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "thread_1"})),
            )
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/threads/thread_1/messages"))
            .and(body_partial_json(
                serde_json::json!({"role": "user", "content": "Hello"}),
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "msg_1"})),
            )
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/threads/thread_1/runs"))
            .and(body_partial_json(serde_json::json!({"assistant_id": "asst_1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "run_1", "status": "queued"})),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_chat_reply_returns_completion_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "messages": [
                    {"role": "system", "content": "You are a helpful assistant."},
                    {"role": "user", "content": "Hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Hi there!"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = chat_client(&server).get_reply("Hello").await.unwrap();
        assert_eq!(reply, "Hi there!");
    }

    #[tokio::test]
    async fn test_chat_reply_surfaces_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .expect(1)
            .mount(&server)
            .await;

        let error = chat_client(&server).get_reply("Hello").await.unwrap_err();
        assert!(matches!(error, AppError::Completion(_)));
    }

    #[tokio::test]
    async fn test_chat_reply_rejects_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let error = chat_client(&server).get_reply("Hello").await.unwrap_err();
        assert!(matches!(error, AppError::Completion(_)));
    }

    #[tokio::test]
    async fn test_assistant_reply_polls_until_completed() {
        let server = MockServer::start().await;
        mount_assistant_setup(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/threads/thread_1/runs/run_1"))
            .and(header("OpenAI-Beta", "assistants=v2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "run_1", "status": "completed"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/threads/thread_1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{
                    "role": "assistant",
                    "content": [{"type": "text", "text": {"value": "Hi there!", "annotations": []}}]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = assistant_client(&server).get_reply("Hello").await.unwrap();
        assert_eq!(reply, "Hi there!");
    }

    #[tokio::test]
    async fn test_assistant_reply_times_out_after_poll_budget() {
        let server = MockServer::start().await;
        mount_assistant_setup(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/threads/thread_1/runs/run_1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "run_1", "status": "in_progress"})),
            )
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/threads/thread_1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .expect(0)
            .mount(&server)
            .await;

        let error = assistant_client(&server).get_reply("Hello").await.unwrap_err();
        assert!(matches!(error, AppError::CompletionTimeout(3)));
    }

    #[tokio::test]
    async fn test_assistant_reply_treats_failed_run_as_fault() {
        let server = MockServer::start().await;
        mount_assistant_setup(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/threads/thread_1/runs/run_1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "run_1", "status": "failed"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let error = assistant_client(&server).get_reply("Hello").await.unwrap_err();
        assert!(matches!(error, AppError::Completion(_)));
    }
}
