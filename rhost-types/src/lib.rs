#![deny(missing_debug_implementations)]

//! Wire data model for the rhost host-side control protocol: message ids,
//! the request/response envelope, `eval` flags, and parse-status codes.
//!
//! This crate has no opinion on transport or evaluation; it only knows how
//! to mint ids and turn frames into [`Message`] values and back.

pub mod flags;
pub mod id;
pub mod message;
pub mod parse_status;

pub use flags::{EvalEnv, EvalFlags, EvalFlagsError};
pub use id::{Id, IdGenerator};
pub use message::{decode, encode_request, encode_response, encode_shutdown, DecodeError, Message};
pub use parse_status::ParseStatus;
