#![deny(missing_debug_implementations)]

//! A host-side implementation of a message-oriented control protocol for an
//! embedded interactive interpreter. Embedding the interpreter itself —
//! starting its process, registering these callbacks against its native
//! API — is out of scope; this crate owns the wire protocol, the
//! evaluation/cancellation state machines, and the thread discipline around
//! them (see `SPEC_FULL.md`).

pub mod callbacks;
pub mod cancel;
pub mod engine;
pub mod error;
pub mod eval_stack;
pub mod evaluator;
pub mod inner_loop;
pub mod mailbox;
pub mod mock;
pub mod session;
pub mod transport;

pub use callbacks::{Answer, CallbackHandlers};
pub use cancel::CancelController;
pub use engine::{Engine, EngineCallbacks, EngineError, EngineEvalResult};
pub use error::HostError;
pub use eval_stack::{EvalStack, Frame};
pub use mailbox::Mailbox;
pub use mock::MockEngine;
pub use session::{run_io_worker, Session, SessionIo, PROTOCOL_VERSION};
pub use transport::{Transport, TransportError};
