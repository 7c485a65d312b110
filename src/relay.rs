use crate::config::AppConfig;
use crate::error::AppError;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_API_BASE: &str = "https://api.twilio.com";
const WHATSAPP_PREFIX: &str = "whatsapp:";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Prepends the WhatsApp channel prefix exactly once. Webhook senders
/// usually arrive with it, the configured from-number often without.
pub fn normalize_whatsapp_address(address: &str) -> String {
    if address.starts_with(WHATSAPP_PREFIX) {
        address.to_string()
    } else {
        format!("{WHATSAPP_PREFIX}{address}")
    }
}

/// The subset of the relay's message resource we read back.
#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

#[derive(Clone)]
pub struct RelayClient {
    client: Client,
    account_sid: String,
    auth_token: String,
    from_address: String,
    api_base: String,
}
impl RelayClient {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(anyhow::Error::new)?;

        Ok(Self {
            client,
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            from_address: config.whatsapp_from.clone(),
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Submits the outbound message, returning the relay's delivery sid.
    #[instrument(skip(self, body), fields(to = %to))]
    pub async fn send_message(&self, to: &str, body: &str) -> Result<String, AppError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        );
        let params = [
            ("From", normalize_whatsapp_address(&self.from_address)),
            ("To", normalize_whatsapp_address(to)),
            ("Body", body.to_string()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Relay(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Relay(format!("{status}: {error_text}")));
        }

        let created: MessageResource = response
            .json()
            .await
            .map_err(|e| AppError::Relay(format!("Malformed send response: {e}")))?;

        debug!("Relay accepted message {}", created.sid);
        Ok(created.sid)
    }
}

#[cfg(test)]
mod normalize_tests {
    use super::*;

    #[test]
    fn test_prefix_prepended_exactly_once() {
        assert_eq!(
            normalize_whatsapp_address("+15551234567"),
            "whatsapp:+15551234567"
        );
    }

    #[test]
    fn test_prefixed_address_unchanged() {
        assert_eq!(
            normalize_whatsapp_address("whatsapp:+15551234567"),
            "whatsapp:+15551234567"
        );
    }
}
