use thiserror::Error;
use uuid::Uuid;

/// Domain refusals raised by ledger and moderation operations. These travel
/// inside `anyhow::Error` and are recovered with `downcast_ref` by callers
/// that need to tell them apart from storage failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("message text rejected by content filter")]
    ContentRejected,

    #[error("user {user_id} may not modify message {message_id}")]
    Unauthorized { user_id: Uuid, message_id: Uuid },

    #[error("no matching messages found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),
}
