use thiserror::Error;

use rhost_types::{DecodeError, EvalFlagsError};

/// Everything that can go wrong on the engine thread (§4.J, §7).
///
/// `EvalCancel` is not a user-facing failure: it is the unwinding signal
/// described in §9 — propagated with `?` the way an exception would unwind
/// C++ destructors, caught at the nearest blocking-callback boundary, and
/// turned into an `Engine::interrupt()` call. Every other variant is fatal:
/// logged, then handed to `Engine::suicide`.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("cancellation in progress, unwind to the nearest callback boundary")]
    EvalCancel,

    #[error("lost connection to client")]
    LostConnection,

    #[error("client requested an orderly shutdown")]
    PeerShutdown,

    #[error("malformed frame: {0}")]
    Malformed(#[from] DecodeError),

    #[error("malformed eval request: {0}")]
    MalformedEval(#[from] EvalFlagsError),

    #[error("mailbox protocol violation: {0}")]
    MailboxViolation(String),

    #[error(
        "received response ['{received_request_id}','{received_name}'], while awaiting response for ['{awaited_id}','{awaited_name}']"
    )]
    ResponseMismatch {
        received_request_id: String,
        received_name: String,
        awaited_id: String,
        awaited_name: String,
    },

    #[error("unrecognized incoming message name '{0}'")]
    UnrecognizedMessage(String),

    #[error("evaluation request must have the form [id, '=<flags>', expr]")]
    MalformedEvalArgs,

    #[error("'{name}': evaluation result couldn't be parsed as JSON: {source}\n\n{value}")]
    MalformedEvalResult {
        name: String,
        source: serde_json::Error,
        value: String,
    },

    #[error("{0}")]
    Other(String),
}

impl HostError {
    /// True for every variant except the internal cancellation-unwind signal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, HostError::EvalCancel)
    }
}
