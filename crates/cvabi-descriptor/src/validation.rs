use std::fmt;
use std::str::FromStr;

/// How much a consumer trusts the descriptor producer.
///
/// Descriptors come from compiler-generated read-only sections, never from
/// external input. `Hardened` checks every structural invariant and reports a
/// [`crate::DescriptorError`]; `Trusting` skips those checks. Both modes keep
/// every read in bounds: a malformed descriptor under `Trusting` yields absent
/// fields, not undefined behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Validation {
    Hardened,
    Trusting,
}

impl Validation {
    pub fn as_str(self) -> &'static str {
        match self {
            Validation::Hardened => "hardened",
            Validation::Trusting => "trusting",
        }
    }

    pub fn is_hardened(self) -> bool {
        matches!(self, Validation::Hardened)
    }

    /// The build-time default: hardened under the `hardened` feature or with
    /// debug assertions enabled.
    pub const fn build_default() -> Self {
        if cfg!(any(feature = "hardened", debug_assertions)) {
            Validation::Hardened
        } else {
            Validation::Trusting
        }
    }
}

impl Default for Validation {
    fn default() -> Self {
        Self::build_default()
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ValidationParseError {
    value: String,
}

impl fmt::Display for ValidationParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid validation mode {:?} (expected one of: hardened, trusting)",
            self.value
        )
    }
}

impl std::error::Error for ValidationParseError {}

impl FromStr for Validation {
    type Err = ValidationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "hardened" | "debug" | "1" => Ok(Validation::Hardened),
            "trusting" | "release" | "0" => Ok(Validation::Trusting),
            _ => Err(ValidationParseError { value: s }),
        }
    }
}
