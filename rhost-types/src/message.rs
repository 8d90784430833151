use serde_json::Value;
use thiserror::Error;

use crate::id::Id;

/// A decoded protocol message (§3, §4.B).
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `[id, name, ...args]`
    Request {
        id: Id,
        name: String,
        args: Vec<Value>,
    },
    /// `[id, ":", request_id, name, ...args]`
    Response {
        id: Id,
        request_id: Id,
        name: String,
        args: Vec<Value>,
    },
    /// A top-level JSON `null`: "shut down cleanly".
    Shutdown,
}

impl Message {
    pub fn name(&self) -> &str {
        match self {
            Message::Request { name, .. } => name,
            Message::Response { name, .. } => name,
            Message::Shutdown => "",
        }
    }

    pub fn args(&self) -> &[Value] {
        match self {
            Message::Request { args, .. } => args,
            Message::Response { args, .. } => args,
            Message::Shutdown => &[],
        }
    }

    pub fn request_id(&self) -> Option<&Id> {
        match self {
            Message::Response { request_id, .. } => Some(request_id),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<&Id> {
        match self {
            Message::Request { id, .. } => Some(id),
            Message::Response { id, .. } => Some(id),
            Message::Shutdown => None,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Message::Request { name, .. } if name == "/")
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("message must be a JSON array or null, got: {0}")]
    NotAnArrayOrNull(Value),
    #[error("message must be of the form [id, name, ...], got array of length {0}")]
    TooShort(usize),
    #[error("message id (array[0]) must be a string")]
    IdNotAString,
    #[error("message name (array[1]) must be a string")]
    NameNotAString,
    #[error(
        "response message must be of the form [id, ':', request_id, name, ...], got array of length {0}"
    )]
    ResponseTooShort(usize),
    #[error("response request_id (array[2]) must be a string")]
    RequestIdNotAString,
    #[error("response name (array[3]) must be a string")]
    ResponseNameNotAString,
}

/// Decodes one frame (a single JSON value) into a [`Message`].
///
/// Mirrors the shape checks `on_ws_message` performs in the original
/// implementation: both of the first two array elements must be strings,
/// and `name == ":"` switches to the four-element response shape.
pub fn decode(frame: &str) -> Result<Message, DecodeError> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    if value.is_null() {
        return Ok(Message::Shutdown);
    }

    let array = value
        .as_array()
        .ok_or_else(|| DecodeError::NotAnArrayOrNull(value.clone()))?;

    if array.len() < 2 {
        return Err(DecodeError::TooShort(array.len()));
    }

    let id = array[0].as_str().ok_or(DecodeError::IdNotAString)?;
    let name = array[1].as_str().ok_or(DecodeError::NameNotAString)?;

    if name == ":" {
        if array.len() < 4 {
            return Err(DecodeError::ResponseTooShort(array.len()));
        }
        let request_id = array[2].as_str().ok_or(DecodeError::RequestIdNotAString)?;
        let response_name = array[3]
            .as_str()
            .ok_or(DecodeError::ResponseNameNotAString)?;

        Ok(Message::Response {
            id: Id::from(id),
            request_id: Id::from(request_id),
            name: response_name.to_owned(),
            args: array[4..].to_vec(),
        })
    } else {
        Ok(Message::Request {
            id: Id::from(id),
            name: name.to_owned(),
            args: array[2..].to_vec(),
        })
    }
}

/// Encodes a request frame: `[id, name, ...args]`.
pub fn encode_request(id: &Id, name: &str, args: &[Value]) -> String {
    let mut array = vec![Value::String(id.as_str().to_owned()), Value::String(name.to_owned())];
    array.extend(args.iter().cloned());
    Value::Array(array).to_string()
}

/// Encodes a response frame: `[id, ":", request_id, name, ...args]`.
pub fn encode_response(id: &Id, request_id: &Id, name: &str, args: &[Value]) -> String {
    let mut array = vec![
        Value::String(id.as_str().to_owned()),
        Value::String(":".to_owned()),
        Value::String(request_id.as_str().to_owned()),
        Value::String(name.to_owned()),
    ];
    array.extend(args.iter().cloned());
    Value::Array(array).to_string()
}

/// Encodes the shutdown frame: a bare JSON `null`.
pub fn encode_shutdown() -> String {
    Value::Null.to_string()
}
