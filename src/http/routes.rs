use crate::error::AppError;
use crate::http::types::WhatsappForm;
use crate::http::HttpState;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use tracing::{debug, info, instrument, warn};

/// Substituted for the reply whenever the Completion Service faults in
/// synchronous mode; the webhook still acknowledges with 200.
pub const APOLOGY_REPLY: &str =
    "I apologize, but I encountered an error. Please try again later.";

pub const LIVENESS_MESSAGE: &str = "WhatsApp bot is up and running!";

pub async fn health() -> &'static str {
    LIVENESS_MESSAGE
}

/// Inbound message webhook: acknowledge non-message callbacks, otherwise
/// generate a reply and deliver it back through the relay.
#[instrument(skip(state, payload))]
pub async fn whatsapp_webhook(
    State(state): State<HttpState>,
    Form(payload): Form<WhatsappForm>,
) -> Result<(StatusCode, &'static str), AppError> {
    debug!("Inbound webhook payload: {payload:?}");

    let Some(body) = payload.body.as_deref() else {
        info!(
            status = ?payload.message_status,
            "Ignoring callback without a message body"
        );
        return Ok((StatusCode::OK, "Ignored"));
    };

    let message = body.trim();
    if message.is_empty() {
        return Err(AppError::InvalidRequest("Missing message body".to_string()));
    }

    let sender = payload.from.trim();
    if sender.is_empty() {
        return Err(AppError::InvalidRequest(
            "Missing sender address".to_string(),
        ));
    }
    info!(
        sid = ?payload.message_sid,
        profile = ?payload.profile_name,
        "Handling message from {sender}"
    );

    let reply = match state.completion.get_reply(message).await {
        Ok(reply) => reply,
        Err(timeout @ AppError::CompletionTimeout(_)) => return Err(timeout),
        Err(e) => {
            warn!("Substituting apology reply after completion fault: {e}");
            APOLOGY_REPLY.to_string()
        }
    };
    debug!("Derived reply for {sender}: {reply}");

    let delivery_sid = state.relay.send_message(sender, &reply).await?;
    info!("Delivered reply to {sender} as {delivery_sid}");

    Ok((StatusCode::OK, "OK"))
}
