use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::error;
use rhost_types::{decode, encode_request, encode_shutdown, EvalEnv, Id, IdGenerator, Message, ParseStatus};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::callbacks::{CallbackHandlers, TickCallback};
use crate::cancel::CancelController;
use crate::engine::{Engine, EngineError};
use crate::error::HostError;
use crate::eval_stack::EvalStack;
use crate::inner_loop::Dispatch;
use crate::mailbox::Mailbox;
use crate::transport::Transport;

/// Protocol version advertised in the greeting (§3 "Lifecycles", §6).
pub const PROTOCOL_VERSION: f64 = 1.0;

/// One engine session's shared state and entry points. Embedding — starting
/// the engine process, registering these handlers as its C-ABI callbacks —
/// is out of scope (§1); this owns only the protocol-facing half.
pub struct Session {
    engine: Arc<dyn Engine>,
    callbacks: Arc<CallbackHandlers>,
    dispatch: Dispatch,
}

/// The half of a session's state the async I/O task needs. Returned
/// alongside [`Session`] by [`Session::new`]; pass it to [`run_io_worker`]
/// together with a connected [`Transport`].
pub struct SessionIo {
    pub outgoing_rx: UnboundedReceiver<String>,
    pub mailbox: Arc<Mailbox>,
    pub cancel: Arc<CancelController>,
    pub transport_closed: Arc<AtomicBool>,
}

impl Session {
    pub fn new(engine: Arc<dyn Engine>) -> (Self, SessionIo) {
        let stack = Arc::new(EvalStack::new());
        let cancel = Arc::new(CancelController::new(Arc::clone(&stack)));
        let mailbox = Arc::new(Mailbox::new());
        let ids = Arc::new(Mutex::new(IdGenerator::new()));
        let callbacks_permitted = Arc::new(AtomicBool::new(true));
        let transport_closed = Arc::new(AtomicBool::new(false));
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        let dispatch = Dispatch {
            engine: Arc::clone(&engine),
            stack,
            cancel: Arc::clone(&cancel),
            ids: Arc::clone(&ids),
            callbacks_permitted: Arc::clone(&callbacks_permitted),
            outgoing: outgoing_tx.clone(),
            transport_closed: Arc::clone(&transport_closed),
        };

        let callbacks = Arc::new(CallbackHandlers::new(
            ids,
            outgoing_tx,
            Arc::clone(&mailbox),
            Arc::clone(&cancel),
            callbacks_permitted,
            dispatch.clone(),
        ));

        let io = SessionIo {
            outgoing_rx,
            mailbox,
            cancel,
            transport_closed,
        };

        (
            Session {
                engine,
                callbacks,
                dispatch,
            },
            io,
        )
    }

    pub fn callbacks(&self) -> &Arc<CallbackHandlers> {
        &self.callbacks
    }

    /// Sends the greeting (§C.1 — consumes host id `#0#`) and runs the
    /// top-level read-eval-print loop on the calling thread, which must be a
    /// dedicated OS thread for the engine's entire lifetime (§5: it is the
    /// only thread permitted to call into the engine). Returns when the
    /// client disconnects, sends an orderly shutdown, or a fatal protocol
    /// error occurs; the latter is reported to the engine via `suicide`.
    ///
    /// The console line read at the prompt is evaluated directly against the
    /// engine's global environment and its result/error is written out via
    /// the `!`/`!!` callback — it is not wrapped in the `=`-protocol's
    /// id-correlated response, which is reserved for client-originated
    /// nested `eval` requests (§4.H) dispatched from inside a blocking
    /// callback (§4.G).
    pub fn run(&self, product_name: &str, engine_version: &str) {
        let greeting_id = self.dispatch.mint();
        let frame = encode_request(
            &greeting_id,
            product_name,
            &[json!(PROTOCOL_VERSION), json!(engine_version)],
        );
        self.dispatch.send_frame(frame);

        loop {
            let context = self.engine.context_frames();
            let line = match self
                .callbacks
                .read_console(&context, 4096, true, "> ", |s| s.len() < 4096)
            {
                Ok(Some(line)) => line,
                Ok(None) => break,
                // Reaching here always means the cancel target was the
                // sentinel frame: any other target is absorbed by the
                // nested `eval` frame it names before unwinding gets this
                // far (§9 "pre/post hooks"). This is the Rust analogue of
                // control returning to the top-level loop after the
                // original's non-local interrupt.
                Err(HostError::EvalCancel) => {
                    self.dispatch.cancel.clear_if_target(&Id::sentinel());
                    self.callbacks.notify_cancellation_complete();
                    continue;
                }
                Err(e) => return self.fail(&e),
            };

            if self.engine.parse(&line) != ParseStatus::Ok {
                continue;
            }

            let tick = TickCallback {
                cancel: &self.dispatch.cancel,
                engine: self.engine.as_ref(),
            };
            match self.engine.eval(&line, EvalEnv::Global, &tick) {
                Ok(result) => {
                    if let Some(value) = result.value {
                        self.callbacks.write_output(&format!("{value}\n"), false);
                    }
                    if let Some(error) = result.error {
                        self.callbacks.write_output(&format!("{error}\n"), true);
                    }
                }
                Err(EngineError::Interrupted) => {
                    self.dispatch.cancel.clear_if_target(&Id::sentinel());
                    self.callbacks.notify_cancellation_complete();
                }
                Err(EngineError::Other(message)) => {
                    self.callbacks.write_output(&message, true);
                }
            }
        }

        self.shutdown();
    }

    fn fail(&self, e: &HostError) {
        error!("fatal protocol error: {e}");
        self.engine.suicide(&e.to_string());
        self.shutdown();
    }

    /// §C.6: sends one last `null` frame on the way out, mirroring the
    /// original's `atexit_handler`.
    pub fn shutdown(&self) {
        self.dispatch.send_frame(encode_shutdown());
    }
}

/// Drives one session's transport (§5 "I/O worker thread"): decodes frames
/// and feeds them to the mailbox or cancellation controller — bypassing the
/// mailbox entirely for cancellation and shutdown messages (§4.C, §4.E) —
/// and forwards outgoing frames from the engine thread to the socket.
pub async fn run_io_worker<S>(mut transport: Transport<S>, mut io: SessionIo)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    loop {
        tokio::select! {
            frame = transport.recv() => {
                match frame {
                    Ok(Some(text)) => handle_incoming(&text, &io),
                    Ok(None) => {
                        io.transport_closed.store(true, Ordering::Release);
                        break;
                    }
                    Err(e) => {
                        error!("transport error: {e}");
                        io.transport_closed.store(true, Ordering::Release);
                        break;
                    }
                }
            }
            outgoing = io.outgoing_rx.recv() => {
                match outgoing {
                    Some(text) => {
                        if let Err(e) = transport.send(text).await {
                            error!("send failed: {e}");
                            io.transport_closed.store(true, Ordering::Release);
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

fn handle_incoming(text: &str, io: &SessionIo) {
    match decode(text) {
        Ok(Message::Shutdown) => io.mailbox.deliver_always(Message::Shutdown),
        Ok(msg) if msg.is_cancellation() => {
            let target = msg.args().first().and_then(|v| v.as_str()).map(Id::from);
            io.cancel.request_cancel(target.as_ref());
        }
        Ok(msg) => {
            if let Err(e) = io.mailbox.deliver(msg) {
                error!("mailbox protocol violation: {e}");
                io.transport_closed.store(true, Ordering::Release);
            }
        }
        Err(e) => {
            error!("malformed frame: {e}");
            io.transport_closed.store(true, Ordering::Release);
        }
    }
}
