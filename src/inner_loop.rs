use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{trace, warn};
use rhost_types::{Id, IdGenerator, Message};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::cancel::CancelController;
use crate::engine::Engine;
use crate::error::HostError;
use crate::evaluator::handle_eval;
use crate::eval_stack::EvalStack;
use crate::mailbox::Mailbox;

/// How long each poll of the mailbox blocks before the loop checks event
/// pumping, transport closure, and cancellation applicability again (§4.G).
/// There is no wakeup-channel equivalent of `PostThreadMessage` here: the
/// mailbox's own condvar already wakes the waiter the instant a message
/// arrives, so this timeout only bounds how promptly the *other* checks run.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Everything the inner loop and evaluator need to dispatch a nested `eval`
/// request and keep sending messages, bundled so neither has to thread five
/// separate `Arc`s through every call (§4.G, §4.H).
#[derive(Clone)]
pub struct Dispatch {
    pub engine: Arc<dyn Engine>,
    pub stack: Arc<EvalStack>,
    pub cancel: Arc<CancelController>,
    pub ids: Arc<Mutex<IdGenerator>>,
    pub callbacks_permitted: Arc<AtomicBool>,
    pub outgoing: UnboundedSender<String>,
    pub transport_closed: Arc<AtomicBool>,
}

impl Dispatch {
    pub fn mint(&self) -> Id {
        self.ids.lock().unwrap().mint()
    }

    pub fn send_frame(&self, frame: String) {
        trace!("-> {frame}");
        let _ = self.outgoing.send(frame);
    }
}

/// Runs on the engine thread while a blocking callback awaits its response
/// (§4.G). Blocks until the mailbox holds a `RECEIVED` message whose
/// `request_id` matches `awaited_id` and whose `name` matches `awaited_name`,
/// dispatching any nested `eval` requests it sees along the way. Returns the
/// matched response's `args`.
pub fn run_inner_loop(
    dispatch: &Dispatch,
    mailbox: &Mailbox,
    cancel: &CancelController,
    awaited_id: &Id,
    awaited_name: &str,
) -> Result<Vec<Value>, HostError> {
    loop {
        match mailbox.wait_take(POLL_INTERVAL) {
            Some(Message::Shutdown) => return Err(HostError::PeerShutdown),
            Some(Message::Response {
                request_id, name, ..
            }) if &request_id != awaited_id || name != awaited_name => {
                return Err(HostError::ResponseMismatch {
                    received_request_id: request_id.to_string(),
                    received_name: name,
                    awaited_id: awaited_id.to_string(),
                    awaited_name: awaited_name.to_owned(),
                })
            }
            Some(Message::Response { args, .. }) => return Ok(args),
            Some(Message::Request { id, name, args }) if rhost_types::EvalFlags::is_eval_request(&name) => {
                handle_eval(dispatch, &id, &name, args)?;
                // `wait_take` just reset the mailbox to UNEXPECTED; the
                // blocking call this loop is serving is still outstanding,
                // so re-arm it before waiting for the next message.
                mailbox.expect()?;
            }
            Some(Message::Request { name, .. }) => {
                return Err(HostError::UnrecognizedMessage(name));
            }
            None => {
                // §C.7: the event pump runs protected; its errors are logged, never propagated.
                if let Err(e) = dispatch.engine.pump_events() {
                    warn!("event pump returned an error: {e}");
                }
                if dispatch.transport_closed.load(Ordering::Acquire) {
                    return Err(HostError::LostConnection);
                }
                if cancel.cancellation_applicable() {
                    return Err(HostError::EvalCancel);
                }
            }
        }
    }
}
