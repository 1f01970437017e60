//! The swap process state machine
//!
//! A single pure reducer owns the answer to "what step is the swap on".
//! Components never assign fields directly; they dispatch actions through
//! a [`SwapStateHandle`], which serializes transitions in arrival order.
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

// ---------
// | Types |
// ---------

/// The step a swap process is on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SwapStep {
    /// No swap in progress; also the post-reset state
    #[default]
    Idle,
    /// A quote fetch is in flight
    FetchingQuote,
    /// Transaction construction has been requested
    GettingTransaction,
    /// The local signer has been invoked
    Signing,
    /// The signed transaction has been submitted for settlement
    Confirming,
    /// The swap settled; a transaction id is recorded
    Success,
    /// The swap terminated with an error
    Error,
}

/// The full state of a swap process
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwapProcessState {
    /// The current step
    pub step: SwapStep,
    /// Whether a quote fetch is in flight
    pub is_quote_loading: bool,
    /// Whether a swap execution is in flight
    pub is_swapping: bool,
    /// The user-facing message of the last quote failure
    pub quote_error: Option<String>,
    /// The user-facing message of the last swap failure
    pub swap_error: Option<String>,
    /// Whether the current quote has aged past the freshness window
    pub quote_expired: bool,
    /// The settlement id; set iff `step == Success`
    pub tx_id: Option<String>,
}

/// A named transition of the swap process state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SwapAction {
    /// A quote fetch began
    FetchQuoteStart,
    /// The in-flight quote fetch succeeded
    FetchQuoteSuccess,
    /// The in-flight quote fetch failed with a user-facing message
    FetchQuoteError(String),
    /// A swap execution began
    SwapStart,
    /// The execution advanced to an intermediate step
    SwapStep(SwapStep),
    /// The swap settled with the given transaction id
    SwapSuccess(String),
    /// The swap terminated with an error message
    SwapError(String),
    /// The current quote aged past the freshness window
    QuoteExpired,
    /// Surface a user-visible message without changing the step
    SetGenericError(String),
    /// Return to the initial state
    ResetSwap,
}

// -----------
// | Reducer |
// -----------

/// Apply an action to the state, producing the next state
///
/// `Success` is terminal for everything except [`SwapAction::ResetSwap`]:
/// once a transaction id is recorded it is never overwritten in place.
pub fn reduce(state: &SwapProcessState, action: SwapAction) -> SwapProcessState {
    if state.step == SwapStep::Success && action != SwapAction::ResetSwap {
        warn!(?action, "ignoring action dispatched after swap success");
        return state.clone();
    }

    let mut next = state.clone();
    match action {
        SwapAction::FetchQuoteStart => {
            next.step = SwapStep::FetchingQuote;
            next.is_quote_loading = true;
            next.quote_error = None;
        },
        SwapAction::FetchQuoteSuccess => {
            next.step = SwapStep::Idle;
            next.is_quote_loading = false;
            next.quote_expired = false;
        },
        SwapAction::FetchQuoteError(msg) => {
            next.step = SwapStep::Idle;
            next.is_quote_loading = false;
            next.quote_error = Some(msg);
        },
        SwapAction::SwapStart => {
            next.is_swapping = true;
            next.swap_error = None;
        },
        SwapAction::SwapStep(step) => match step {
            SwapStep::GettingTransaction | SwapStep::Signing | SwapStep::Confirming => {
                next.step = step;
            },
            // Stepping back to idle ends any in-flight swap
            SwapStep::Idle => {
                next.step = SwapStep::Idle;
                next.is_swapping = false;
            },
            _ => warn!(?step, "ignoring invalid intermediate swap step"),
        },
        SwapAction::SwapSuccess(tx_id) => {
            next.step = SwapStep::Success;
            next.tx_id = Some(tx_id);
            next.is_swapping = false;
        },
        SwapAction::SwapError(msg) => {
            next.step = SwapStep::Error;
            next.swap_error = Some(msg);
            next.is_swapping = false;
        },
        SwapAction::QuoteExpired => {
            next.quote_expired = true;
        },
        SwapAction::SetGenericError(msg) => {
            next.swap_error = Some(msg);
        },
        SwapAction::ResetSwap => {
            next = SwapProcessState::default();
        },
    }

    next
}

// ----------------
// | State Handle |
// ----------------

/// A thread-safe handle to the swap process state
///
/// The mutex makes dispatches atomic and ordered; every component shares
/// one handle per trading session.
#[derive(Clone, Default)]
pub struct SwapStateHandle {
    /// The current state behind a lock
    inner: Arc<Mutex<SwapProcessState>>,
}

impl SwapStateHandle {
    /// Create a handle holding the initial state
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an action to the state
    pub fn dispatch(&self, action: SwapAction) {
        let mut state = self.inner.lock().expect("swap state lock poisoned");
        debug!(?action, step = ?state.step, "dispatching swap action");
        *state = reduce(&state, action);
    }

    /// Snapshot the current state
    pub fn snapshot(&self) -> SwapProcessState {
        self.inner.lock().expect("swap state lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Walk the happy path and check the state at each step
    #[test]
    fn test_happy_path_transitions() {
        let handle = SwapStateHandle::new();

        handle.dispatch(SwapAction::FetchQuoteStart);
        assert_eq!(handle.snapshot().step, SwapStep::FetchingQuote);
        assert!(handle.snapshot().is_quote_loading);

        handle.dispatch(SwapAction::FetchQuoteSuccess);
        assert_eq!(handle.snapshot().step, SwapStep::Idle);

        handle.dispatch(SwapAction::SwapStart);
        handle.dispatch(SwapAction::SwapStep(SwapStep::GettingTransaction));
        handle.dispatch(SwapAction::SwapStep(SwapStep::Signing));
        handle.dispatch(SwapAction::SwapStep(SwapStep::Confirming));
        assert!(handle.snapshot().is_swapping);

        handle.dispatch(SwapAction::SwapSuccess("tx123".to_string()));
        let state = handle.snapshot();
        assert_eq!(state.step, SwapStep::Success);
        assert_eq!(state.tx_id.as_deref(), Some("tx123"));
        assert!(!state.is_swapping);
    }

    /// Test that success is terminal until an explicit reset
    #[test]
    fn test_success_only_exits_via_reset() {
        let handle = SwapStateHandle::new();
        handle.dispatch(SwapAction::SwapSuccess("tx123".to_string()));

        // No other action may follow success or overwrite the tx id
        handle.dispatch(SwapAction::SwapSuccess("tx456".to_string()));
        handle.dispatch(SwapAction::SwapError("late failure".to_string()));
        handle.dispatch(SwapAction::SwapStep(SwapStep::Signing));
        let state = handle.snapshot();
        assert_eq!(state.step, SwapStep::Success);
        assert_eq!(state.tx_id.as_deref(), Some("tx123"));

        handle.dispatch(SwapAction::ResetSwap);
        assert_eq!(handle.snapshot(), SwapProcessState::default());
    }

    /// Test that quote expiry flags the state without changing the step
    #[test]
    fn test_quote_expired_preserves_step() {
        let handle = SwapStateHandle::new();
        handle.dispatch(SwapAction::SwapStart);
        handle.dispatch(SwapAction::SwapStep(SwapStep::GettingTransaction));

        handle.dispatch(SwapAction::QuoteExpired);
        let state = handle.snapshot();
        assert_eq!(state.step, SwapStep::GettingTransaction);
        assert!(state.quote_expired);
    }

    /// Test that stepping back to idle never leaves a swap marked as in
    /// flight
    #[test]
    fn test_step_to_idle_clears_is_swapping() {
        let handle = SwapStateHandle::new();
        handle.dispatch(SwapAction::SwapStart);
        handle.dispatch(SwapAction::SwapStep(SwapStep::GettingTransaction));
        assert!(handle.snapshot().is_swapping);

        handle.dispatch(SwapAction::SwapStep(SwapStep::Idle));
        let state = handle.snapshot();
        assert_eq!(state.step, SwapStep::Idle);
        assert!(!state.is_swapping);
    }

    /// Test that every terminal action clears the in-flight flag
    #[test]
    fn test_terminal_paths_clear_is_swapping() {
        for terminal in [
            SwapAction::SwapSuccess("tx123".to_string()),
            SwapAction::SwapError("boom".to_string()),
            SwapAction::ResetSwap,
        ] {
            let handle = SwapStateHandle::new();
            handle.dispatch(SwapAction::SwapStart);
            assert!(handle.snapshot().is_swapping);

            handle.dispatch(terminal);
            assert!(!handle.snapshot().is_swapping);
        }
    }

    /// Test that a generic error message does not move the step
    #[test]
    fn test_generic_error_keeps_step() {
        let handle = SwapStateHandle::new();
        handle.dispatch(SwapAction::SwapStart);
        handle.dispatch(SwapAction::SwapStep(SwapStep::GettingTransaction));

        handle.dispatch(SwapAction::SetGenericError("retrying with a higher fee".to_string()));
        let state = handle.snapshot();
        assert_eq!(state.step, SwapStep::GettingTransaction);
        assert_eq!(state.swap_error.as_deref(), Some("retrying with a higher fee"));
    }
}
