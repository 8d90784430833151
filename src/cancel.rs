use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rhost_types::Id;

use crate::eval_stack::EvalStack;

/// Decides, at each engine yield point, whether a cancellation is applicable
/// and drives the `reentry_guard`/`EvalCancel` discipline around it (§4.E).
///
/// The `(canceling, target_id)` pair lives inside [`EvalStack`] itself so it
/// shares that struct's mutex with the evaluation stack, per §5's "two small
/// mutexes" policy. `reentry_guard` is deliberately a separate `AtomicBool`
/// (§C.3 of the supplemented features): it exists only to stop the tick
/// callback from invoking interrupt a second time while a previous interrupt
/// is still unwinding, which is an orthogonal concern to the cancel target
/// itself.
#[derive(Debug)]
pub struct CancelController {
    stack: Arc<EvalStack>,
    reentry_guard: AtomicBool,
}

impl CancelController {
    pub fn new(stack: Arc<EvalStack>) -> Self {
        CancelController {
            stack,
            reentry_guard: AtomicBool::new(false),
        }
    }

    /// Handles an inbound `["id", "/", target_or_null]` request. Never uses
    /// the mailbox (§4.C); always "succeeds" from the caller's point of view
    /// even if the request was dropped as belated or superseded.
    pub fn request_cancel(&self, target: Option<&Id>) {
        self.stack.request_cancel(target);
    }

    /// Called from the tick callback: true means the engine's interrupt
    /// primitive should be invoked right now. Also sets the reentry guard so
    /// a second tick arriving mid-unwind does not re-invoke interrupt.
    pub fn should_interrupt_from_tick(&self) -> bool {
        if self.reentry_guard.load(Ordering::Acquire) {
            return false;
        }
        if self.stack.cancellation_applicable() {
            self.reentry_guard.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Clears the reentry guard. Called on entry to every blocking callback
    /// handler (§C.3): each one is a clean resumption point.
    pub fn clear_reentry_guard(&self) {
        self.reentry_guard.store(false, Ordering::Release);
    }

    /// True if cancellation is requested and not vetoed by a non-cancelable
    /// frame (§4.E "Applicability of cancellation"); used by the inner loop
    /// (§4.G step 4) to decide whether to raise [`crate::error::HostError::EvalCancel`].
    pub fn cancellation_applicable(&self) -> bool {
        self.stack.cancellation_applicable()
    }

    pub fn is_canceling(&self) -> bool {
        self.stack.is_canceling()
    }

    /// True if the current cancel target is the sentinel (top-level prompt)
    /// frame — the condition for sending the `"\\"` notification (§4.E).
    pub fn target_is_sentinel(&self) -> bool {
        self.stack.target_is_sentinel()
    }

    /// Clears cancellation state if `request_id` was the target (§4.H step 3),
    /// called after an evaluation returns normally.
    pub fn clear_if_target(&self, request_id: &Id) {
        self.stack.clear_if_target(request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval_stack::Frame;

    #[test]
    fn tick_does_not_interrupt_without_a_cancel_request() {
        let stack = Arc::new(EvalStack::new());
        let ctrl = CancelController::new(stack);
        assert!(!ctrl.should_interrupt_from_tick());
    }

    #[test]
    fn tick_interrupts_once_then_waits_for_guard_clear() {
        let stack = Arc::new(EvalStack::new());
        stack.push(Frame::new(Id::from("a"), true));
        let ctrl = CancelController::new(stack);
        ctrl.request_cancel(Some(&Id::from("a")));
        assert!(ctrl.should_interrupt_from_tick());
        assert!(!ctrl.should_interrupt_from_tick());
        ctrl.clear_reentry_guard();
        assert!(ctrl.should_interrupt_from_tick());
    }

    #[test]
    fn noncancelable_frame_vetoes_interrupt() {
        let stack = Arc::new(EvalStack::new());
        stack.push(Frame::new(Id::from("a"), false));
        let ctrl = CancelController::new(stack);
        ctrl.request_cancel(Some(&Id::from("a")));
        assert!(ctrl.is_canceling());
        assert!(!ctrl.cancellation_applicable());
        assert!(!ctrl.should_interrupt_from_tick());
    }

    #[test]
    fn belated_cancel_is_a_silent_no_op() {
        let stack = Arc::new(EvalStack::new());
        let ctrl = CancelController::new(stack);
        ctrl.request_cancel(Some(&Id::from("ghost")));
        assert!(!ctrl.is_canceling());
    }
}
