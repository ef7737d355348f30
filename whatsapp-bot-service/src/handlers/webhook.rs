//! Inbound WhatsApp webhook: form parsing and the XML reply envelope.

use crate::services::InboundMessage;
use crate::startup::AppState;
use axum::{
    extract::{rejection::FormRejection, State},
    http::header,
    response::{IntoResponse, Response},
    Form,
};
use quick_xml::escape::escape;
use serde::Deserialize;
use service_core::error::AppError;
use tracing::instrument;

/// Fields posted by the messaging provider. Everything else is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookForm {
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "To")]
    pub to: Option<String>,
    #[serde(rename = "Body")]
    pub body: Option<String>,
}

impl WebhookForm {
    /// Strips the address scheme from both numbers (and the `+` from the
    /// restaurant number) and case-folds the body.
    pub fn into_message(self, address_prefix: &str) -> Result<InboundMessage, AppError> {
        let customer_phone = strip_scheme(self.from.as_deref().unwrap_or_default(), address_prefix);
        let restaurant_phone =
            strip_scheme(self.to.as_deref().unwrap_or_default(), address_prefix)
                .trim_start_matches('+');
        let text = self.body.as_deref().unwrap_or_default().trim().to_lowercase();

        if customer_phone.is_empty() || restaurant_phone.is_empty() || text.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!("Missing parameters")));
        }

        Ok(InboundMessage {
            customer_phone: customer_phone.to_string(),
            restaurant_phone: restaurant_phone.to_string(),
            text,
        })
    }
}

fn strip_scheme<'a>(raw: &'a str, prefix: &str) -> &'a str {
    let raw = raw.trim();
    raw.strip_prefix(prefix).unwrap_or(raw).trim()
}

/// Single-message reply document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingReply(pub String);

impl MessagingReply {
    pub fn to_xml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Response><Message>{}</Message></Response>"#,
            escape(self.0.as_str())
        )
    }
}

impl IntoResponse for MessagingReply {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "text/xml")], self.to_xml()).into_response()
    }
}

/// `POST /webhooks/whatsapp`
///
/// A body that is not a form is a bad request like any other malformed input.
#[instrument(skip(state, form))]
pub async fn whatsapp_webhook(
    State(state): State<AppState>,
    form: Result<Form<WebhookForm>, FormRejection>,
) -> Result<MessagingReply, AppError> {
    let Form(form) = form.map_err(|rejection| {
        AppError::BadRequest(anyhow::anyhow!("Invalid form body: {}", rejection.body_text()))
    })?;
    let message = form.into_message(&state.address_prefix)?;
    let outcome = state.engine.handle_turn(&message).await?;
    Ok(MessagingReply(outcome.reply))
}
