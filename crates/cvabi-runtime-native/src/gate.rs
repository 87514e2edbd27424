//! Violation dispatch gate: reentrancy guard and termination policy.
//!
//! ```text
//!            report (not ignore/quick_enforce)
//!   Normal ─────────────────────────────────▶ InHandler
//!     ▲                                          │
//!     │ handler returned, observe                │ handler returned, enforcing
//!     └──────────────────────────────────────────┤ handler panicked
//!                                                │ reentrant report
//!                                                ▼
//!                                           Terminated
//! ```
//!
//! Each thread owns its own [`DispatchGate`]; one thread's violation never
//! blocks or changes another's.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, warn};

use crate::{EvaluationSemantic, ViolationView};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    Normal,
    InHandler,
    Terminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    /// The handler returned under an enforcing semantic.
    Enforced,
    /// `quick_enforce`: terminate without calling the handler.
    QuickEnforce,
    /// A violation was reported while this thread's handler was running.
    Reentrant,
    /// A violation was reported after this thread already terminated.
    AlreadyTerminated,
    HandlerPanicked,
    /// The descriptor failed hardened validation.
    MalformedDescriptor,
}

impl TerminationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminationReason::Enforced => "enforced",
            TerminationReason::QuickEnforce => "quick_enforce",
            TerminationReason::Reentrant => "reentrant",
            TerminationReason::AlreadyTerminated => "already_terminated",
            TerminationReason::HandlerPanicked => "handler_panicked",
            TerminationReason::MalformedDescriptor => "malformed_descriptor",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Control returns to the violating code.
    Continue,
    /// The caller must terminate the process.
    Terminate(TerminationReason),
}

/// The replaceable user handler.
pub trait ViolationHandler {
    fn handle(&self, view: &ViolationView<'_>);
}

impl<F> ViolationHandler for F
where
    F: Fn(&ViolationView<'_>),
{
    fn handle(&self, view: &ViolationView<'_>) {
        self(view)
    }
}

/// Per-thread dispatch state.
#[derive(Debug)]
pub struct DispatchGate {
    state: Cell<GateState>,
}

impl Default for DispatchGate {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchGate {
    pub const fn new() -> Self {
        Self {
            state: Cell::new(GateState::Normal),
        }
    }

    pub fn state(&self) -> GateState {
        self.state.get()
    }

    /// Records a termination decided outside the gate.
    pub fn terminate(&self, reason: TerminationReason) -> Dispatch {
        self.state.set(GateState::Terminated);
        Dispatch::Terminate(reason)
    }

    /// Runs one violation through the gate.
    ///
    /// The handler is invoked at most once per call and never while this
    /// gate is already in a handler.
    pub fn report<H>(&self, view: &ViolationView<'_>, handler: &H) -> Dispatch
    where
        H: ViolationHandler + ?Sized,
    {
        match self.state.get() {
            GateState::Terminated => {
                return Dispatch::Terminate(TerminationReason::AlreadyTerminated);
            }
            GateState::InHandler => {
                warn!(
                    semantic = %view.semantic(),
                    "contract violation reported from inside the violation handler"
                );
                return self.terminate(TerminationReason::Reentrant);
            }
            GateState::Normal => {}
        }

        let semantic = view.semantic();
        match semantic {
            EvaluationSemantic::Ignore => {
                debug!("ignored contract violation");
                return Dispatch::Continue;
            }
            EvaluationSemantic::QuickEnforce => {
                return self.terminate(TerminationReason::QuickEnforce);
            }
            _ => {}
        }

        self.state.set(GateState::InHandler);
        debug!(
            semantic = %semantic,
            detection = %view.detection_mode(),
            "invoking violation handler"
        );
        let returned = catch_unwind(AssertUnwindSafe(|| handler.handle(view)));

        if returned.is_err() {
            warn!("violation handler panicked");
            return self.terminate(TerminationReason::HandlerPanicked);
        }
        if self.state.get() == GateState::Terminated {
            // A reentrant report already decided the outcome.
            return Dispatch::Terminate(TerminationReason::Reentrant);
        }
        if semantic.is_enforcing() {
            return self.terminate(TerminationReason::Enforced);
        }
        self.state.set(GateState::Normal);
        Dispatch::Continue
    }
}
