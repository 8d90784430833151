use thiserror::Error;

use rhost_types::{EvalEnv, ParseStatus};

/// Errors an [`Engine`] implementation can report back to the core.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("evaluation interrupted")]
    Interrupted,
    #[error("engine error: {0}")]
    Other(String),
}

/// The outcome of one `Engine::eval` call, already separated into the three
/// fields the evaluator (§4.H step 4) embeds in a response:
/// `[parse_status, error_or_null, value_or_null]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineEvalResult {
    pub parse_status: ParseStatus,
    pub value: Option<String>,
    pub error: Option<String>,
}

/// Callbacks the engine invokes on its own initiative while evaluating
/// (§4.F). `tick` is the engine's only cooperative interrupt-check point
/// (§4.E); an engine implementation must call it periodically during a long
/// evaluation and stop as soon as it returns `Err`.
pub trait EngineCallbacks: Send + Sync {
    fn tick(&self) -> Result<(), EngineError>;
}

/// The boundary to the embedded interpreter. Starting, stopping, and
/// embedding the real engine is explicitly out of scope (§1); this trait
/// only names the operations the core drives it through. Every call the
/// core makes into an `Engine` happens from the single dedicated OS thread
/// that owns the session for its entire lifetime (§5) — the `Send + Sync`
/// bound exists only so the session can hand an `Arc<dyn Engine>` to that
/// thread at startup, not because the engine is ever touched concurrently.
pub trait Engine: Send + Sync {
    /// Parses `expr` without evaluating it, reporting one of the five parse
    /// statuses (§4.H step 1).
    fn parse(&self, expr: &str) -> ParseStatus;

    /// Evaluates `expr` (already known to parse as `Ok`) in `env`, calling
    /// `callbacks.tick()` between evaluation steps. Returns
    /// `Err(EngineError::Interrupted)` if a tick signalled cancellation —
    /// the idiomatic-Rust analogue of the engine's interrupt primitive
    /// unwinding by non-local jump (§9).
    fn eval(
        &self,
        expr: &str,
        env: EvalEnv,
        callbacks: &dyn EngineCallbacks,
    ) -> Result<EngineEvalResult, EngineError>;

    /// Requests that the engine stop at its next tick. Called only from the
    /// tick callback's handler (§4.E "Interrupt discipline").
    fn interrupt(&self);

    /// The engine's current call-frame stack, reported verbatim as the
    /// `context_frames` argument of `>`/`?` requests (§C.2, purely
    /// informational).
    fn context_frames(&self) -> Vec<i64>;

    /// Drives one round of external event processing (windowing, plot
    /// devices, ...). Errors are caught and logged by the inner loop, never
    /// propagated into it (§C.7).
    fn pump_events(&self) -> Result<(), EngineError>;

    /// Raises an engine-level error from outside normal evaluation — used
    /// when a blocking callback is refused during a non-`@` eval (§7); the
    /// engine is expected to surface this as the evaluation's `error` field.
    fn raise_error(&self, message: &str);

    /// Shuts the interpreter down after a fatal protocol error (§4.J, §7).
    fn suicide(&self, reason: &str);

    fn version(&self) -> String;
}
