use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::trace;
use rhost_types::{encode_request, Id, IdGenerator};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::cancel::CancelController;
use crate::engine::{EngineCallbacks, EngineError};
use crate::error::HostError;
use crate::inner_loop::{run_inner_loop, Dispatch};
use crate::mailbox::Mailbox;

/// The six engine-visible hooks (§4.F), bound to one session's transport and
/// shared protocol state. Non-blocking handlers (`write_output`,
/// `show_message`, `busy`, `plot_xaml`) encode, send, and return. Blocking
/// handlers (`read_console`, `yes_no_cancel`) mint an id, await the matched
/// response by running the inner message loop (§4.G), and are the engine's
/// only legitimate suspension points (§5).
#[derive(Debug)]
pub struct CallbackHandlers {
    ids: Arc<Mutex<IdGenerator>>,
    outgoing: UnboundedSender<String>,
    mailbox: Arc<Mailbox>,
    cancel: Arc<CancelController>,
    callbacks_permitted: Arc<AtomicBool>,
    dispatch: Dispatch,
}

/// The user's answer to a `?` yes/no/cancel dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Cancel,
}

impl CallbackHandlers {
    pub fn new(
        ids: Arc<Mutex<IdGenerator>>,
        outgoing: UnboundedSender<String>,
        mailbox: Arc<Mailbox>,
        cancel: Arc<CancelController>,
        callbacks_permitted: Arc<AtomicBool>,
        dispatch: Dispatch,
    ) -> Self {
        CallbackHandlers {
            ids,
            outgoing,
            mailbox,
            cancel,
            callbacks_permitted,
            dispatch,
        }
    }

    fn send(&self, id: &Id, name: &str, args: &[Value]) {
        let frame = encode_request(id, name, args);
        trace!("-> {frame}");
        // The outgoing channel's receiver lives as long as the session; a
        // send error here means the I/O task already exited, which the
        // inner loop's transport-closed check will observe independently.
        let _ = self.outgoing.send(frame);
    }

    pub(crate) fn mint(&self) -> Id {
        self.ids.lock().unwrap().mint()
    }

    pub fn callbacks_permitted_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.callbacks_permitted)
    }

    /// Entry sequence shared by both blocking handlers (§4.F steps 1-2). Step
    /// 1's "clear state left over from a just-completed top-level
    /// cancellation" is handled by the caller: since `EvalCancel` reaching a
    /// blocking handler's own `run_inner_loop` call always means the target
    /// was the sentinel (any other target is absorbed by the nested `eval`
    /// frame it names), the caller catches that `Err` and performs step 1's
    /// clear-and-notify once it is back at a safe point, the Rust analogue
    /// of the original's non-local jump returning control to the top-level
    /// loop before `ReadConsole` is entered again.
    fn enter_blocking_callback(&self) -> Result<(), HostError> {
        self.cancel.clear_reentry_guard();
        if !self.callbacks_permitted.load(Ordering::Acquire) {
            return Err(HostError::Other(
                "blocking callback refused during non-@ evaluation".to_owned(),
            ));
        }
        Ok(())
    }

    /// Sends the `"\\"` top-level-cancellation-finished notification (§4.F
    /// step 1, §4.E).
    pub fn notify_cancellation_complete(&self) {
        self.send(&self.mint(), "\\", &[]);
    }

    /// `!`/`!!` — standard or error console output (non-blocking).
    pub fn write_output(&self, text: &str, is_error: bool) {
        let name = if is_error { "!!" } else { "!" };
        self.send(&self.mint(), name, &[json!(text)]);
    }

    /// `![]` — informational dialog (non-blocking).
    pub fn show_message(&self, text: &str) {
        self.send(&self.mint(), "![]", &[json!(text)]);
    }

    /// `~+` / `~-` — busy indicator (non-blocking).
    pub fn busy(&self, busy: bool) {
        self.send(&self.mint(), if busy { "~+" } else { "~-" }, &[]);
    }

    /// `PlotXaml` — one-shot plotting notification (non-blocking, §6).
    pub fn plot_xaml(&self, path: &str) {
        self.send(&self.mint(), "PlotXaml", &[json!(path)]);
    }

    /// `>` — the interactive prompt (blocking). Returns `Ok(None)` on EOF.
    /// Retries with a fresh id and a `retry_reason` argument if the engine
    /// rejects the response for being too long (§4.F "Read-prompt retry").
    pub fn read_console(
        &self,
        context_frames: &[i64],
        buffer_len: u32,
        add_to_history: bool,
        prompt_text: &str,
        fits: impl Fn(&str) -> bool,
    ) -> Result<Option<String>, HostError> {
        self.enter_blocking_callback()?;

        let mut retry_reason: Option<&str> = None;
        loop {
            let id = self.mint();
            self.mailbox.expect()?;
            self.send(
                &id,
                ">",
                &[
                    json!(context_frames),
                    json!(buffer_len),
                    json!(add_to_history),
                    retry_reason.map_or(Value::Null, |r| json!(r)),
                    json!(prompt_text),
                ],
            );

            let response = run_inner_loop(&self.dispatch, &self.mailbox, &self.cancel, &id, ">")?;
            match response.into_iter().next() {
                None | Some(Value::Null) => return Ok(None),
                Some(Value::String(line)) if fits(&line) => return Ok(Some(line)),
                Some(Value::String(_)) => {
                    retry_reason = Some("BUFFER_OVERFLOW");
                    continue;
                }
                Some(_) => {
                    return Err(HostError::Other(
                        "read-console response must be a string or null".to_owned(),
                    ))
                }
            }
        }
    }

    /// `?` — yes/no/cancel dialog (blocking).
    pub fn yes_no_cancel(
        &self,
        context_frames: &[i64],
        message: &str,
    ) -> Result<Answer, HostError> {
        self.enter_blocking_callback()?;

        let id = self.mint();
        self.mailbox.expect()?;
        self.send(&id, "?", &[json!(context_frames), json!(message)]);

        let response = run_inner_loop(&self.dispatch, &self.mailbox, &self.cancel, &id, "?")?;
        match response.into_iter().next() {
            Some(Value::String(s)) if s == "Y" => Ok(Answer::Yes),
            Some(Value::String(s)) if s == "N" => Ok(Answer::No),
            Some(Value::String(s)) if s == "C" => Ok(Answer::Cancel),
            _ => Err(HostError::Other(
                "yes-no-cancel response must be one of \"Y\"/\"N\"/\"C\"".to_owned(),
            )),
        }
    }
}

/// Scopes the shared `callbacks_permitted` flag for the duration of one
/// `eval` (§4.F "Callbacks-permitted flag"), restoring the previous value on
/// drop — covers both normal return and unwinding via `?`.
pub struct CallbacksPermittedGuard {
    flag: Arc<AtomicBool>,
    previous: bool,
}

impl CallbacksPermittedGuard {
    pub fn scoped(flag: Arc<AtomicBool>, allow: bool) -> Self {
        let previous = flag.swap(allow, Ordering::AcqRel);
        CallbacksPermittedGuard { flag, previous }
    }
}

impl Drop for CallbacksPermittedGuard {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::Release);
    }
}

/// The host's tick callback (§4.E "Interrupt discipline"): the only place
/// that consults the cancellation controller and invokes the engine's
/// interrupt primitive.
pub struct TickCallback<'a> {
    pub cancel: &'a CancelController,
    pub engine: &'a dyn crate::engine::Engine,
}

impl EngineCallbacks for TickCallback<'_> {
    fn tick(&self) -> Result<(), EngineError> {
        if self.cancel.should_interrupt_from_tick() {
            self.engine.interrupt();
            Err(EngineError::Interrupted)
        } else {
            Ok(())
        }
    }
}
