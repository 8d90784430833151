use std::sync::Mutex;

use rhost_types::Id;

/// A single in-flight evaluation frame (§3 "Evaluation frame").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: Id,
    pub cancelable: bool,
}

impl Frame {
    pub fn new(id: Id, cancelable: bool) -> Self {
        Frame { id, cancelable }
    }

    /// The sentinel bottom frame representing the top-level read-prompt loop.
    pub fn sentinel() -> Self {
        Frame {
            id: Id::sentinel(),
            cancelable: true,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    frames: Vec<Frame>,
    canceling: bool,
    target_id: Option<Id>,
}

/// LIFO stack of evaluation frames, always non-empty (§4.D, §8 invariant 1),
/// sharing one mutex with the cancellation target `(canceling, target_id)`
/// (§5 "Shared-resource policy": `eval_mutex` guards both). Frames are
/// pushed and popped only from the engine thread; [`crate::cancel`] reads
/// and writes the cancellation fields through the same lock so a cancel
/// request and a stack mutation can never interleave inconsistently.
#[derive(Debug)]
pub struct EvalStack {
    state: Mutex<State>,
}

impl Default for EvalStack {
    fn default() -> Self {
        EvalStack {
            state: Mutex::new(State {
                frames: vec![Frame::sentinel()],
                canceling: false,
                target_id: None,
            }),
        }
    }
}

impl EvalStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: Frame) {
        self.state.lock().unwrap().frames.push(frame);
    }

    /// Pops the top frame, asserting it is the one the caller expects.
    ///
    /// Panics on mismatch: a violated stack-ordering invariant (§4.D) means
    /// push/pop discipline elsewhere in the evaluator is broken, which is a
    /// programming error rather than a recoverable protocol fault.
    pub fn pop(&self, expected_id: &Id) {
        let mut state = self.state.lock().unwrap();
        let top = state
            .frames
            .pop()
            .expect("evaluation stack must never become empty");
        assert_eq!(
            &top.id, expected_id,
            "evaluation stack popped out of LIFO order"
        );
    }

    /// True if `id` names a frame currently on the stack (the sentinel's id
    /// is the empty string, matching a `null` cancellation target).
    pub fn contains(&self, id: &Id) -> bool {
        self.state.lock().unwrap().frames.iter().any(|f| &f.id == id)
    }

    /// True if any frame on the stack is non-cancelable (§4.E "Applicability
    /// of cancellation").
    pub fn has_noncancelable_frame(&self) -> bool {
        self.state.lock().unwrap().frames.iter().any(|f| !f.cancelable)
    }

    /// Depth (0 = sentinel only) of the frame named `id`, or `None` if it is
    /// not on the stack. Used to decide which of two concurrent cancel
    /// targets is deeper (§4.E, §5 "collapse").
    pub fn depth_of(&self, id: &Id) -> Option<usize> {
        self.state.lock().unwrap().frames.iter().position(|f| &f.id == id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Requests cancellation of the frame named `id` (`None` = sentinel,
    /// i.e. "cancel to top level"). Implements §4.E's receipt rule and §5's
    /// collapse rule ("the one targeting the deepest (bottom-most) frame
    /// dominates"). Stack index 0 is the sentinel — the bottom, i.e. the
    /// *deepest* frame in the spec's terminology — so a smaller index beats
    /// a larger one. Returns `true` if the request was accepted, `false` if
    /// dropped (belated, or shallower than an already-unwinding target).
    pub(crate) fn request_cancel(&self, id: Option<&Id>) -> bool {
        let mut state = self.state.lock().unwrap();
        let wanted = id.cloned().unwrap_or_else(Id::sentinel);
        let Some(new_depth) = state.frames.iter().position(|f| f.id == wanted) else {
            return false;
        };
        if state.canceling {
            let current_depth = state
                .target_id
                .as_ref()
                .and_then(|t| state.frames.iter().position(|f| &f.id == t));
            if let Some(current_depth) = current_depth {
                if current_depth < new_depth {
                    // current target is already deeper (more bottom-ward); it
                    // will unwind through the newly requested frame anyway
                    return false;
                }
            }
        }
        state.canceling = true;
        state.target_id = Some(wanted);
        true
    }

    pub(crate) fn is_canceling(&self) -> bool {
        self.state.lock().unwrap().canceling
    }

    pub(crate) fn target_id(&self) -> Option<Id> {
        self.state.lock().unwrap().target_id.clone()
    }

    /// True if cancellation is both requested and currently unblocked: the
    /// target is on the stack and no non-cancelable frame is present.
    pub(crate) fn cancellation_applicable(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.canceling && !state.frames.iter().any(|f| !f.cancelable)
    }

    /// Called after an evaluation with id `request_id` returns normally: if
    /// it was the cancel target, clears the cancellation (§4.H step 3).
    pub(crate) fn clear_if_target(&self, request_id: &Id) {
        let mut state = self.state.lock().unwrap();
        if state.target_id.as_ref() == Some(request_id) {
            state.canceling = false;
            state.target_id = None;
        }
    }

    /// True if the cancel target is the sentinel frame (top-level prompt).
    pub(crate) fn target_is_sentinel(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.target_id.as_ref() == Some(&Id::sentinel())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_sentinel_only() {
        let stack = EvalStack::new();
        assert_eq!(stack.len(), 1);
        assert!(stack.contains(&Id::sentinel()));
    }

    #[test]
    fn push_pop_is_lifo() {
        let stack = EvalStack::new();
        let a = Id::from("a");
        let b = Id::from("b");
        stack.push(Frame::new(a.clone(), true));
        stack.push(Frame::new(b.clone(), false));
        assert_eq!(stack.len(), 3);
        stack.pop(&b);
        stack.pop(&a);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    #[should_panic(expected = "LIFO order")]
    fn pop_wrong_id_panics() {
        let stack = EvalStack::new();
        stack.push(Frame::new(Id::from("a"), true));
        stack.pop(&Id::from("wrong"));
    }

    #[test]
    fn noncancelable_frame_is_detected() {
        let stack = EvalStack::new();
        assert!(!stack.has_noncancelable_frame());
        stack.push(Frame::new(Id::from("a"), false));
        assert!(stack.has_noncancelable_frame());
    }

    #[test]
    fn depth_of_reports_position() {
        let stack = EvalStack::new();
        stack.push(Frame::new(Id::from("a"), true));
        stack.push(Frame::new(Id::from("b"), true));
        assert_eq!(stack.depth_of(&Id::sentinel()), Some(0));
        assert_eq!(stack.depth_of(&Id::from("a")), Some(1));
        assert_eq!(stack.depth_of(&Id::from("b")), Some(2));
        assert_eq!(stack.depth_of(&Id::from("nope")), None);
    }

    #[test]
    fn cancel_collapses_to_deepest_target() {
        let stack = EvalStack::new();
        stack.push(Frame::new(Id::from("a"), true));
        stack.push(Frame::new(Id::from("b"), true));
        // "a" (depth 1) is deeper than "b" (depth 2) in the bottom-most sense.
        assert!(stack.request_cancel(Some(&Id::from("a"))));
        // Re-targeting "b", which is shallower than the already-targeted
        // "a", is dropped: unwinding to "a" unwinds "b" along the way.
        assert!(!stack.request_cancel(Some(&Id::from("b"))));
        assert_eq!(stack.target_id(), Some(Id::from("a")));
        // But targeting the sentinel (depth 0) is deeper still, and wins.
        assert!(stack.request_cancel(None));
        assert_eq!(stack.target_id(), Some(Id::sentinel()));
    }

    #[test]
    fn cancel_of_missing_target_is_dropped() {
        let stack = EvalStack::new();
        assert!(!stack.request_cancel(Some(&Id::from("ghost"))));
        assert!(!stack.is_canceling());
    }

    #[test]
    fn clear_if_target_only_clears_matching_id() {
        let stack = EvalStack::new();
        stack.push(Frame::new(Id::from("a"), true));
        assert!(stack.request_cancel(Some(&Id::from("a"))));
        stack.clear_if_target(&Id::from("other"));
        assert!(stack.is_canceling());
        stack.clear_if_target(&Id::from("a"));
        assert!(!stack.is_canceling());
    }
}
