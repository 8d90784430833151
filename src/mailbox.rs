use std::sync::{Condvar, Mutex};
use std::time::Duration;

use rhost_types::Message;

use crate::error::HostError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unexpected,
    Expected,
    Received,
}

/// One-slot handoff from the I/O worker to the engine thread (§4.C).
///
/// Single-producer (I/O worker calls [`Mailbox::deliver`]), single-consumer
/// (engine thread calls [`Mailbox::expect`]/[`Mailbox::take`]). The
/// cancellation message `"/"` bypasses this entirely — see
/// [`crate::cancel::CancelController`] — so it is never passed to `deliver`.
#[derive(Debug)]
pub struct Mailbox {
    state: Mutex<(State, Option<Message>)>,
    ready: Condvar,
}

impl Default for Mailbox {
    fn default() -> Self {
        Mailbox {
            state: Mutex::new((State::Unexpected, None)),
            ready: Condvar::new(),
        }
    }
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine thread: `UNEXPECTED -> EXPECTED`. Fatal if a message is
    /// already sitting unconsumed (`RECEIVED`) — that would mean the engine
    /// issued a second blocking request before consuming the first.
    pub fn expect(&self) -> Result<(), HostError> {
        let mut guard = self.state.lock().unwrap();
        if guard.0 == State::Received {
            return Err(HostError::MailboxViolation(
                "expect() called while a message is still RECEIVED".to_owned(),
            ));
        }
        guard.0 = State::Expected;
        Ok(())
    }

    /// I/O worker: stores `msg` and wakes the engine thread, iff the state
    /// was `EXPECTED`. Any other state is a fatal protocol violation (§4.C).
    pub fn deliver(&self, msg: Message) -> Result<(), HostError> {
        let mut guard = self.state.lock().unwrap();
        if guard.0 != State::Expected {
            return Err(HostError::MailboxViolation(format!(
                "received unsolicited message while mailbox state was {:?}",
                guard.0
            )));
        }
        guard.1 = Some(msg);
        guard.0 = State::Received;
        self.ready.notify_one();
        Ok(())
    }

    /// Delivers `msg` regardless of the current state, for the messages
    /// that bypass the mailbox's expectation rule entirely: the cancellation
    /// request (handled separately, see [`crate::cancel`]) and the top-level
    /// `null` shutdown, which the original implementation accepts no matter
    /// what the host happens to be waiting for.
    pub fn deliver_always(&self, msg: Message) {
        let mut guard = self.state.lock().unwrap();
        guard.1 = Some(msg);
        guard.0 = State::Received;
        self.ready.notify_one();
    }

    /// Engine thread: non-blocking poll. Returns the message and resets to
    /// `UNEXPECTED` if one is `RECEIVED`, else `None`.
    pub fn try_take(&self) -> Option<Message> {
        let mut guard = self.state.lock().unwrap();
        if guard.0 == State::Received {
            guard.0 = State::Unexpected;
            guard.1.take()
        } else {
            None
        }
    }

    /// Blocks (with a bounded wait, so callers can interleave other polling
    /// such as event pumping and cancellation checks — §4.G) until a message
    /// is `RECEIVED`, then takes it.
    pub fn wait_take(&self, timeout: Duration) -> Option<Message> {
        let guard = self.state.lock().unwrap();
        let (mut guard, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |(state, _)| *state != State::Received)
            .unwrap();
        if guard.0 == State::Received {
            guard.0 = State::Unexpected;
            guard.1.take()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhost_types::Id;

    fn sample_response() -> Message {
        Message::Response {
            id: Id::from("#2#"),
            request_id: Id::from("c1"),
            name: ">".to_owned(),
            args: vec![],
        }
    }

    #[test]
    fn deliver_before_expect_is_fatal() {
        let mailbox = Mailbox::new();
        assert!(mailbox.deliver(sample_response()).is_err());
    }

    #[test]
    fn round_trip_expect_deliver_take() {
        let mailbox = Mailbox::new();
        mailbox.expect().unwrap();
        mailbox.deliver(sample_response()).unwrap();
        let msg = mailbox.try_take().unwrap();
        assert_eq!(msg.request_id(), Some(&Id::from("c1")));
        assert!(mailbox.try_take().is_none());
    }

    #[test]
    fn wait_take_times_out_with_nothing_pending() {
        let mailbox = Mailbox::new();
        mailbox.expect().unwrap();
        assert!(mailbox.wait_take(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn double_expect_without_consuming_is_fatal() {
        let mailbox = Mailbox::new();
        mailbox.expect().unwrap();
        mailbox.deliver(sample_response()).unwrap();
        assert!(mailbox.expect().is_err());
    }
}
