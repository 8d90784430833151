use serde::{Deserialize, Serialize};

/// Outcome of parsing an expression string before evaluation (§4.H step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseStatus {
    Null,
    Ok,
    Incomplete,
    Error,
    Eof,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::Null => "NULL",
            ParseStatus::Ok => "OK",
            ParseStatus::Incomplete => "INCOMPLETE",
            ParseStatus::Error => "ERROR",
            ParseStatus::Eof => "EOF",
        }
    }
}

impl std::fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
