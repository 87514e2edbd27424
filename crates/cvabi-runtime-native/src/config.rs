//! Process-wide validation mode.
//!
//! Resolution order: an explicit [`set_validation`] call, then the
//! `CVABI_VALIDATION` environment variable, then the build default.

use std::sync::atomic::{AtomicU8, Ordering};

use cvabi_contracts::ENV_VALIDATION;
use cvabi_descriptor::Validation;
use once_cell::sync::Lazy;
use tracing::warn;

const UNSET: u8 = 0;
const HARDENED: u8 = 1;
const TRUSTING: u8 = 2;

static OVERRIDE: AtomicU8 = AtomicU8::new(UNSET);

static FROM_ENV: Lazy<Validation> =
    Lazy::new(|| validation_from_env_value(std::env::var(ENV_VALIDATION).ok().as_deref()));

fn validation_from_env_value(raw: Option<&str>) -> Validation {
    let Some(raw) = raw else {
        return Validation::build_default();
    };
    match raw.parse::<Validation>() {
        Ok(v) => v,
        Err(err) => {
            warn!(env = ENV_VALIDATION, %err, "ignoring invalid validation override");
            Validation::build_default()
        }
    }
}

/// The validation mode descriptors are parsed with.
pub fn validation() -> Validation {
    match OVERRIDE.load(Ordering::Relaxed) {
        HARDENED => Validation::Hardened,
        TRUSTING => Validation::Trusting,
        _ => *FROM_ENV,
    }
}

/// Overrides the mode for the rest of the process. `None` restores the
/// environment/build default.
pub fn set_validation(mode: Option<Validation>) {
    let raw = match mode {
        Some(Validation::Hardened) => HARDENED,
        Some(Validation::Trusting) => TRUSTING,
        None => UNSET,
    };
    OVERRIDE.store(raw, Ordering::Relaxed);
}
