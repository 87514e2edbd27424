use std::fmt;

/// How a violation was detected. Values from a newer producer are preserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DetectionMode {
    PredicateFalse,
    EvaluationException,
    Unknown(u8),
}

impl DetectionMode {
    pub fn from_raw(v: u8) -> Self {
        match v {
            1 => DetectionMode::PredicateFalse,
            2 => DetectionMode::EvaluationException,
            other => DetectionMode::Unknown(other),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            DetectionMode::PredicateFalse => 1,
            DetectionMode::EvaluationException => 2,
            DetectionMode::Unknown(v) => v,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMode::PredicateFalse => "predicate_false",
            DetectionMode::EvaluationException => "evaluation_exception",
            DetectionMode::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMode::Unknown(v) => write!(f, "unknown({v})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Whether a violation must terminate the program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvaluationSemantic {
    Ignore,
    Observe,
    Enforce,
    QuickEnforce,
    /// A semantic this runtime does not know; treated as enforcing.
    Unknown(u8),
}

impl EvaluationSemantic {
    pub fn from_raw(v: u8) -> Self {
        match v {
            0 => EvaluationSemantic::Ignore,
            1 => EvaluationSemantic::Observe,
            2 => EvaluationSemantic::Enforce,
            3 => EvaluationSemantic::QuickEnforce,
            other => EvaluationSemantic::Unknown(other),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            EvaluationSemantic::Ignore => 0,
            EvaluationSemantic::Observe => 1,
            EvaluationSemantic::Enforce => 2,
            EvaluationSemantic::QuickEnforce => 3,
            EvaluationSemantic::Unknown(v) => v,
        }
    }

    pub fn is_enforcing(self) -> bool {
        !matches!(
            self,
            EvaluationSemantic::Ignore | EvaluationSemantic::Observe
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationSemantic::Ignore => "ignore",
            EvaluationSemantic::Observe => "observe",
            EvaluationSemantic::Enforce => "enforce",
            EvaluationSemantic::QuickEnforce => "quick_enforce",
            EvaluationSemantic::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for EvaluationSemantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationSemantic::Unknown(v) => write!(f, "unknown({v})"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_roundtrip() {
        for v in 0..=255u8 {
            assert_eq!(DetectionMode::from_raw(v).raw(), v);
            assert_eq!(EvaluationSemantic::from_raw(v).raw(), v);
        }
    }

    #[test]
    fn unknown_semantics_enforce() {
        assert!(!EvaluationSemantic::Ignore.is_enforcing());
        assert!(!EvaluationSemantic::Observe.is_enforcing());
        assert!(EvaluationSemantic::Enforce.is_enforcing());
        assert!(EvaluationSemantic::QuickEnforce.is_enforcing());
        assert!(EvaluationSemantic::from_raw(200).is_enforcing());
        assert_eq!(EvaluationSemantic::from_raw(200).to_string(), "unknown(200)");
    }
}
