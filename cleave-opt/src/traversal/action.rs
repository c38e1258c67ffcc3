//! Actions that can be requested from a visitor.
use cleave_utils::CleaveResult;

/// Result of visiting a function.
pub type VisResult = CleaveResult<Action>;

/// Action performed at the end of a visit hook.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    /// Continue the traversal.
    Continue,
    /// Stop visiting the remaining hooks for this function.
    Stop,
}

impl Action {
    /// Run `next` if this action allows the traversal to continue.
    pub fn and_then<F>(self, mut next: F) -> VisResult
    where
        F: FnMut() -> VisResult,
    {
        match self {
            Action::Continue => next(),
            Action::Stop => Ok(Action::Stop),
        }
    }
}
