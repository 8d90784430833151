//! A small in-memory [`Engine`] double: an arithmetic/variable REPL standing
//! in for the real interpreter. Used by the unit tests in this crate and by
//! `demos/host-demo`, the way the teacher's tokio demos double as manual
//! integration tests for its codec.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use rhost_types::{EvalEnv, ParseStatus};

use crate::engine::{Engine, EngineCallbacks, EngineEvalResult, EngineError};

#[derive(Debug, Default)]
pub struct MockEngine {
    vars: Mutex<HashMap<String, f64>>,
    frames: Mutex<Vec<i64>>,
    interrupted: AtomicBool,
    suicided: Mutex<Option<String>>,
    last_raised_error: Mutex<Option<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn did_suicide(&self) -> Option<String> {
        self.suicided.lock().unwrap().clone()
    }

    pub fn last_raised_error(&self) -> Option<String> {
        self.last_raised_error.lock().unwrap().clone()
    }
}

/// A frame pushed on [`MockEngine::eval`] entry and popped on every exit
/// path (including early return via `?`), so `context_frames()` reflects
/// only genuinely in-progress evaluations.
struct FrameGuard<'a> {
    frames: &'a Mutex<Vec<i64>>,
}

impl<'a> FrameGuard<'a> {
    fn enter(frames: &'a Mutex<Vec<i64>>) -> Self {
        let mut guard = frames.lock().unwrap();
        let depth = guard.len() as i64;
        guard.push(depth);
        FrameGuard { frames }
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.frames.lock().unwrap().pop();
    }
}

impl Engine for MockEngine {
    fn parse(&self, expr: &str) -> ParseStatus {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            ParseStatus::Null
        } else if !balanced_parens(trimmed) {
            ParseStatus::Incomplete
        } else {
            ParseStatus::Ok
        }
    }

    fn eval(
        &self,
        expr: &str,
        _env: EvalEnv,
        callbacks: &dyn EngineCallbacks,
    ) -> Result<EngineEvalResult, EngineError> {
        let _frame = FrameGuard::enter(&self.frames);
        let trimmed = expr.trim();

        if trimmed == "loop_forever" {
            loop {
                callbacks.tick()?;
                std::thread::yield_now();
            }
        }

        callbacks.tick()?;

        if trimmed == "Sys.time()" {
            return Ok(EngineEvalResult {
                parse_status: ParseStatus::Ok,
                value: Some("2020-01-01 12:34:56 UTC".to_owned()),
                error: None,
            });
        }

        match evaluate(trimmed, &self.vars) {
            Ok(value) => Ok(EngineEvalResult {
                parse_status: ParseStatus::Ok,
                value: Some(value),
                error: None,
            }),
            Err(message) => Ok(EngineEvalResult {
                parse_status: ParseStatus::Ok,
                value: None,
                error: Some(message),
            }),
        }
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    fn context_frames(&self) -> Vec<i64> {
        self.frames.lock().unwrap().clone()
    }

    fn pump_events(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn raise_error(&self, message: &str) {
        *self.last_raised_error.lock().unwrap() = Some(message.to_owned());
    }

    fn suicide(&self, reason: &str) {
        *self.suicided.lock().unwrap() = Some(reason.to_owned());
    }

    fn version(&self) -> String {
        "rhost-mock-engine/0.1".to_owned()
    }
}

fn balanced_parens(s: &str) -> bool {
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

/// Evaluates one of: a numeric literal, `name <- number` assignment, a bare
/// variable lookup, or `lhs OP rhs` with `OP` in `{+,-,*,/}` and both sides
/// either numbers or variables. Anything else is a evaluation error, not a
/// parse error (mirroring §4.H: parsing and evaluation are distinct steps).
fn evaluate(expr: &str, vars: &Mutex<HashMap<String, f64>>) -> Result<String, String> {
    if let Some((name, rhs)) = expr.split_once("<-") {
        let name = name.trim();
        let value = resolve(rhs.trim(), vars)?;
        vars.lock().unwrap().insert(name.to_owned(), value);
        return Ok(format!("{value}"));
    }

    for op in ['+', '-', '*', '/'] {
        if let Some(idx) = expr.find(op) {
            // avoid splitting a leading unary sign
            if idx == 0 {
                continue;
            }
            let (lhs, rhs) = expr.split_at(idx);
            let lhs = resolve(lhs.trim(), vars)?;
            let rhs = resolve(rhs[1..].trim(), vars)?;
            let result = match op {
                '+' => lhs + rhs,
                '-' => lhs - rhs,
                '*' => lhs * rhs,
                '/' => lhs / rhs,
                _ => unreachable!(),
            };
            return Ok(format!("{result}"));
        }
    }

    resolve(expr, vars).map(|v| format!("{v}"))
}

fn resolve(token: &str, vars: &Mutex<HashMap<String, f64>>) -> Result<f64, String> {
    if let Ok(n) = token.parse::<f64>() {
        return Ok(n);
    }
    vars.lock()
        .unwrap()
        .get(token)
        .copied()
        .ok_or_else(|| format!("object '{token}' not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverInterrupt;
    impl EngineCallbacks for NeverInterrupt {
        fn tick(&self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[test]
    fn evaluates_arithmetic() {
        let engine = MockEngine::new();
        let result = engine
            .eval("1 + 1", EvalEnv::Global, &NeverInterrupt)
            .unwrap();
        assert_eq!(result.value.as_deref(), Some("2"));
        assert!(result.error.is_none());
    }

    #[test]
    fn assigns_and_reads_variables() {
        let engine = MockEngine::new();
        engine.eval("x <- 41", EvalEnv::Global, &NeverInterrupt).unwrap();
        let result = engine.eval("x + 1", EvalEnv::Global, &NeverInterrupt).unwrap();
        assert_eq!(result.value.as_deref(), Some("42"));
    }

    #[test]
    fn unknown_variable_is_an_eval_error_not_fatal() {
        let engine = MockEngine::new();
        let result = engine.eval("nope", EvalEnv::Global, &NeverInterrupt).unwrap();
        assert!(result.value.is_none());
        assert!(result.error.is_some());
    }

    #[test]
    fn unbalanced_parens_parse_as_incomplete() {
        let engine = MockEngine::new();
        assert_eq!(engine.parse("(1 + 1"), ParseStatus::Incomplete);
        assert_eq!(engine.parse("1 + 1"), ParseStatus::Ok);
        assert_eq!(engine.parse(""), ParseStatus::Null);
    }

    struct InterruptAfterOneTick {
        ticks: std::sync::atomic::AtomicU32,
    }
    impl EngineCallbacks for InterruptAfterOneTick {
        fn tick(&self) -> Result<(), EngineError> {
            if self.ticks.fetch_add(1, Ordering::Relaxed) >= 2 {
                Err(EngineError::Interrupted)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn loop_forever_stops_when_tick_interrupts() {
        let engine = MockEngine::new();
        let callbacks = InterruptAfterOneTick {
            ticks: std::sync::atomic::AtomicU32::new(0),
        };
        let result = engine.eval("loop_forever", EvalEnv::Global, &callbacks);
        assert!(matches!(result, Err(EngineError::Interrupted)));
        assert_eq!(engine.context_frames().len(), 0);
    }
}
