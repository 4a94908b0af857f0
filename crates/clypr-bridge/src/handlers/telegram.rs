//! Telegram confirmation webhook.
//!
//! Resolves the token in an inbound update against the registry, confirms it
//! with the backend and acknowledges the waiting job. Chat replies are best
//! effort and never change the response status.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::{debug, info, warn};

use clypr_bridge_protocol::{DeliveryStatus, JobId};
use clypr_bridge_telegram::{IncomingText, Update, incoming_text, start_token};

use crate::registry::now_ms;
use crate::server::AppState;

// ============================================================================
// Replies
// ============================================================================

const REPLY_NOT_UNDERSTOOD: &str =
    "Sorry, I couldn't find a verification code in that message. Open the link from the Clypr app to try again.";
const REPLY_NO_MATCH: &str =
    "That verification code doesn't match any pending request. Please start again from the Clypr app.";
const REPLY_EXPIRED: &str =
    "That verification code has expired. Please request a new one from the Clypr app.";
const REPLY_FAILED: &str =
    "We couldn't confirm this chat right now. Please try again from the Clypr app.";
const REPLY_VERIFIED: &str = "This chat is now verified for Clypr notifications.";

// ============================================================================
// Handler
// ============================================================================

pub async fn telegram_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            debug!(error = %e, "Rejected unparseable Telegram update");
            return (StatusCode::BAD_REQUEST, "invalid update");
        }
    };

    let update_id = update.id.0;
    let Some(IncomingText { chat_id, text }) = incoming_text(&update) else {
        debug!(update_id, "Telegram update without text, ignoring");
        return (StatusCode::OK, "ignored");
    };

    let chat = state.redactor.mask(&chat_id);
    let Some(token) = start_token(&text)
        .map(str::to_string)
        .or_else(|| state.registry.find_in_text(&text))
    else {
        info!(chat = %chat, "No verification token in Telegram message");
        reply(&state, &chat_id, REPLY_NOT_UNDERSTOOD).await;
        return (StatusCode::NOT_FOUND, "no token found");
    };

    let masked = state.redactor.mask(&token);
    let Some(entry) = state.registry.consume(&token) else {
        info!(chat = %chat, token = %masked, "Unknown verification token");
        reply(&state, &chat_id, REPLY_NO_MATCH).await;
        return (StatusCode::NOT_FOUND, "unknown token");
    };

    if entry.is_expired_at(now_ms()) {
        info!(chat = %chat, token = %masked, job_id = entry.job_id, "Verification token expired");
        acknowledge(&state, entry.job_id, DeliveryStatus::Failed).await;
        reply(&state, &chat_id, REPLY_EXPIRED).await;
        return (StatusCode::GONE, "token expired");
    }

    match state.source.bridge_confirm_verification(&token, &chat_id).await {
        Ok(()) => {
            info!(chat = %chat, token = %masked, job_id = entry.job_id, "Telegram chat verified");
            acknowledge(&state, entry.job_id, DeliveryStatus::Delivered).await;
            reply(&state, &chat_id, REPLY_VERIFIED).await;
            (StatusCode::OK, "verified")
        }
        Err(e) => {
            warn!(chat = %chat, token = %masked, job_id = entry.job_id, error = %e, "Backend rejected verification");
            acknowledge(&state, entry.job_id, DeliveryStatus::Failed).await;
            reply(&state, &chat_id, REPLY_FAILED).await;
            (StatusCode::INTERNAL_SERVER_ERROR, "confirmation failed")
        }
    }
}

async fn acknowledge(state: &AppState, job_id: JobId, status: DeliveryStatus) {
    if let Err(e) = state.source.acknowledge_job_delivery(job_id, status).await {
        warn!(job_id, status = %status, error = %e, "Failed to acknowledge verification job");
    }
}

async fn reply(state: &AppState, chat_id: &str, text: &str) {
    let Some(client) = &state.telegram else {
        debug!("No Telegram bot token configured, skipping reply");
        return;
    };
    if let Err(e) = client.send_message(chat_id, text).await {
        warn!(chat = %state.redactor.mask(chat_id), error = %e, "Failed to send Telegram reply");
    }
}
