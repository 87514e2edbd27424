//! Contract-violation runtime: decodes what the compiler emitted at a failing
//! call site and runs it through the violation dispatch gate.
//!
//! C callers use the `extern "C"` functions in [`ffi`]. Rust callers can
//! drive [`dispatch`] directly with their own [`DispatchGate`] and
//! [`ViolationHandler`].

pub mod config;
mod dispatch;
pub mod ffi;
mod gate;
pub mod handler;
mod semantics;
mod view;

pub use dispatch::{dispatch, Violation};
pub use gate::{Dispatch, DispatchGate, GateState, TerminationReason, ViolationHandler};
pub use semantics::{DetectionMode, EvaluationSemantic};
pub use view::ViolationView;
