use thiserror::Error;

/// The environment an `eval` request runs in (§4.H): `B`/`E` are mutually
/// exclusive; neither flag means "the engine's global environment".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalEnv {
    Global,
    Base,
    Empty,
}

/// The decoded flag set of an `"=" <flags>` request name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalFlags {
    pub env: EvalEnv,
    /// `j` — the result string is itself JSON and should be embedded structured.
    pub json_result: bool,
    /// `@` — blocking callbacks are allowed during this evaluation.
    pub allow_callbacks: bool,
    /// `/` — this evaluation is a valid cancellation target.
    pub cancelable: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvalFlagsError {
    #[error("'{0}': multiple environment flags specified")]
    MultipleEnvironments(String),
    #[error("'{0}': unrecognized flag '{1}'")]
    UnrecognizedFlag(String, char),
    #[error("request name does not start with '='")]
    NotAnEvalRequest,
}

impl EvalFlags {
    /// Parses the flags out of a full request name, e.g. `"=B/"`.
    pub fn parse(name: &str) -> Result<Self, EvalFlagsError> {
        if !name.starts_with('=') {
            return Err(EvalFlagsError::NotAnEvalRequest);
        }

        let mut env = None;
        let mut json_result = false;
        let mut allow_callbacks = false;
        let mut cancelable = false;

        for c in name.chars().skip(1) {
            match c {
                'B' | 'E' => {
                    if env.is_some() {
                        return Err(EvalFlagsError::MultipleEnvironments(name.to_owned()));
                    }
                    env = Some(if c == 'B' { EvalEnv::Base } else { EvalEnv::Empty });
                }
                'j' => json_result = true,
                '@' => allow_callbacks = true,
                '/' => cancelable = true,
                other => return Err(EvalFlagsError::UnrecognizedFlag(name.to_owned(), other)),
            }
        }

        Ok(EvalFlags {
            env: env.unwrap_or(EvalEnv::Global),
            json_result,
            allow_callbacks,
            cancelable,
        })
    }

    /// True if `name` (a request name) denotes an `eval`-kind request.
    pub fn is_eval_request(name: &str) -> bool {
        name.starts_with('=')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flags_are_global_noncancelable() {
        let flags = EvalFlags::parse("=").unwrap();
        assert_eq!(flags.env, EvalEnv::Global);
        assert!(!flags.json_result);
        assert!(!flags.allow_callbacks);
        assert!(!flags.cancelable);
    }

    #[test]
    fn parses_combined_flags() {
        let flags = EvalFlags::parse("=B/j@").unwrap();
        assert_eq!(flags.env, EvalEnv::Base);
        assert!(flags.json_result);
        assert!(flags.allow_callbacks);
        assert!(flags.cancelable);
    }

    #[test]
    fn rejects_conflicting_environment_flags() {
        assert_eq!(
            EvalFlags::parse("=BE"),
            Err(EvalFlagsError::MultipleEnvironments("=BE".to_owned()))
        );
    }

    #[test]
    fn rejects_unknown_flag() {
        assert_eq!(
            EvalFlags::parse("=X"),
            Err(EvalFlagsError::UnrecognizedFlag("=X".to_owned(), 'X'))
        );
    }

    #[test]
    fn recognizes_eval_requests_by_leading_equals() {
        assert!(EvalFlags::is_eval_request("=/"));
        assert!(!EvalFlags::is_eval_request(">"));
    }
}
