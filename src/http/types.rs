use serde::Deserialize;

/// Inbound webhook payload, relay-provider form convention. Message
/// deliveries carry `Body`; status callbacks do not and are acknowledged
/// without processing.
#[derive(Debug, Deserialize)]
pub struct WhatsappForm {
    #[serde(rename = "Body")]
    pub body: Option<String>,

    #[serde(rename = "From", default)]
    pub from: String,

    #[serde(rename = "MessageSid")]
    pub message_sid: Option<String>,

    #[serde(rename = "MessageStatus")]
    pub message_status: Option<String>,

    #[serde(rename = "ProfileName")]
    pub profile_name: Option<String>,
}
