//! Messaging gateway handlers.
//!
//! Each handler follows the same path: validate the body, normalize the
//! number, call the messaging client, map the outcome onto the envelope.

use axum::extract::State;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde_json::Value;
use tracing::{info, warn};

use super::RequestBody;
use crate::client::{MediaMessage, MessageContent};
use crate::phone::is_valid_phone_number;
use crate::response::{ApiError, ApiResponse};
use crate::server::AppState;
use crate::validation::{FieldErrors, Rule, require_str, validate};

const CHECK_NUMBER_RULES: &[Rule] = &[Rule::required("number")];
const SEND_MESSAGE_RULES: &[Rule] = &[Rule::required("to"), Rule::required("message")];
const SEND_PDF_RULES: &[Rule] = &[
    Rule::required("tonumber"),
    Rule::required("filename"),
    Rule::required("binarypdf"),
];

/// Standard alphabet, padding optional.
const DOCUMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// POST /checknumber
pub async fn check_number(
    State(state): State<AppState>,
    RequestBody(body): RequestBody,
) -> Result<ApiResponse, ApiError> {
    validate(&body, CHECK_NUMBER_RULES)?;

    // Length check runs on the raw input, before normalization. Only text
    // has a length; a JSON number is not a phone number in the right format.
    let number = match body.get("number") {
        Some(Value::String(number)) if is_valid_phone_number(number) => number,
        _ => return Err(ApiError::InvalidPhoneNumber),
    };

    let address = state.phone.normalize(number);
    if !state.client.is_registered_user(&address).await? {
        return Err(ApiError::NotRegistered);
    }

    Ok(ApiResponse::ok("ok"))
}

/// POST /sendmessage
pub async fn send_message(
    State(state): State<AppState>,
    RequestBody(body): RequestBody,
) -> Result<ApiResponse, ApiError> {
    validate(&body, SEND_MESSAGE_RULES)?;
    let to = require_str(&body, "to")?;
    let message = require_str(&body, "message")?;

    let address = state.phone.normalize(&to);
    if !state.client.is_registered_user(&address).await? {
        return Err(ApiError::NotRegistered);
    }

    let receipt = state
        .client
        .send_message(&address, MessageContent::Text(message))
        .await?;
    info!(to = %address, message_id = ?receipt.message_id, "Message sent");

    Ok(ApiResponse::ok("message successfully sent"))
}

/// POST /sendpdf
///
/// No registration pre-check here; the send itself reports unknown numbers.
pub async fn send_pdf(
    State(state): State<AppState>,
    RequestBody(body): RequestBody,
) -> Result<ApiResponse, ApiError> {
    validate(&body, SEND_PDF_RULES)?;
    let to = require_str(&body, "tonumber")?;
    let filename = require_str(&body, "filename")?;
    let encoded = require_str(&body, "binarypdf")?;

    let address = state.phone.normalize(&to);
    let data = decode_document(&encoded)
        .ok_or_else(|| FieldErrors::single("binarypdf", "Invalid base64 payload"))?;

    let display_name = pdf_display_name(&filename);
    let staged = state.stager.stage(&data, &display_name).await?;
    let media = MediaMessage::pdf(staged.path(), staged.display_name());

    let result = state
        .client
        .send_message(&address, MessageContent::Media(media))
        .await;

    if let Err(e) = staged.unstage().await {
        warn!(error = %e, "Failed to remove staged attachment");
    }

    let receipt = result?;
    info!(to = %address, file = %display_name, message_id = ?receipt.message_id, "Media sent");

    Ok(ApiResponse::ok("media successfully sent"))
}

/// Decode a base64 document, tolerating embedded whitespace, missing padding
/// and a leading `data:...;base64,` prefix.
fn decode_document(encoded: &str) -> Option<Vec<u8>> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    DOCUMENT_ENGINE.decode(compact).ok()
}

fn pdf_display_name(filename: &str) -> String {
    if filename.to_ascii_lowercase().ends_with(".pdf") {
        filename.to_string()
    } else {
        format!("{filename}.pdf")
    }
}

// ============================================================================
// Tests
// ============================================================================
