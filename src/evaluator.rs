use serde_json::Value;

use rhost_types::{encode_response, EvalFlags, Id, ParseStatus};

use crate::callbacks::{CallbacksPermittedGuard, TickCallback};
use crate::engine::EngineError;
use crate::error::HostError;
use crate::eval_stack::Frame;
use crate::inner_loop::Dispatch;

/// Pops `id` from the evaluation stack on drop unless [`StackGuard::disarm`]
/// was called first — guarantees the pop runs even when this frame's
/// `?`-propagated [`HostError::EvalCancel`] unwinds past it (§9 "pre/post
/// hooks"), the same way the original's catch site performs a compensating
/// pop when the post-hook was skipped.
struct StackGuard<'a> {
    dispatch: &'a Dispatch,
    id: Id,
    armed: bool,
}

impl<'a> StackGuard<'a> {
    fn new(dispatch: &'a Dispatch, frame: Frame) -> Self {
        let id = frame.id.clone();
        dispatch.stack.push(frame);
        StackGuard {
            dispatch,
            id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.dispatch.stack.pop(&self.id);
        self.armed = false;
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.dispatch.stack.pop(&self.id);
        }
    }
}

/// Handles one `eval`-kind request, dispatched either as the top-level
/// evaluation of a line read at the prompt or as a nested request arriving
/// while a blocking callback is outstanding (§4.H). Sends the response
/// itself; returns `Err(HostError::EvalCancel)` when cancellation must keep
/// unwinding past this frame into the next outer one (step 5).
pub fn handle_eval(
    dispatch: &Dispatch,
    request_id: &Id,
    name: &str,
    args: Vec<Value>,
) -> Result<(), HostError> {
    let flags = EvalFlags::parse(name)?;
    let expr = match args.as_slice() {
        [Value::String(s)] => s.clone(),
        _ => return Err(HostError::MalformedEvalArgs),
    };

    let parse_status = dispatch.engine.parse(&expr);
    let (value, error) = if parse_status == ParseStatus::Ok {
        let guard = StackGuard::new(dispatch, Frame::new(request_id.clone(), flags.cancelable));
        let permitted =
            CallbacksPermittedGuard::scoped(dispatch.callbacks_permitted.clone(), flags.allow_callbacks);
        let tick = TickCallback {
            cancel: &dispatch.cancel,
            engine: dispatch.engine.as_ref(),
        };

        let outcome = dispatch.engine.eval(&expr, flags.env, &tick);
        drop(permitted);
        guard.disarm();
        dispatch.cancel.clear_if_target(request_id);

        match outcome {
            Ok(result) => (result.value, result.error),
            Err(EngineError::Interrupted) => {
                send_response(dispatch, request_id, name, &[Value::Null]);
                return finish(dispatch, request_id);
            }
            Err(EngineError::Other(message)) => (None, Some(message)),
        }
    } else {
        (None, None)
    };

    let value_json = match (&value, flags.json_result) {
        (Some(raw), true) => serde_json::from_str(raw).map_err(|source| HostError::MalformedEvalResult {
            name: name.to_owned(),
            source,
            value: raw.clone(),
        })?,
        (Some(raw), false) => Value::String(raw.clone()),
        (None, _) => Value::Null,
    };
    let error_json = error.map_or(Value::Null, Value::String);

    send_response(
        dispatch,
        request_id,
        name,
        &[Value::String(parse_status.as_str().to_owned()), error_json, value_json],
    );

    finish(dispatch, request_id)
}

fn send_response(dispatch: &Dispatch, request_id: &Id, name: &str, args: &[Value]) {
    let id = dispatch.mint();
    let frame = encode_response(&id, request_id, name, args);
    dispatch.send_frame(frame);
}

/// Step 5: if cancellation must still propagate further outward, raise it.
fn finish(dispatch: &Dispatch, _request_id: &Id) -> Result<(), HostError> {
    if dispatch.cancel.is_canceling() {
        Err(HostError::EvalCancel)
    } else {
        Ok(())
    }
}
