//! # Attention Levels
//!
//! Severity vocabulary used by connected processes when a log entry needs the
//! user's attention, plus the comparator that decides whether a new signal
//! outranks the one already recorded on a node.
//!
//! Labels arrive as free-form strings from the delivery layer. Anything that does
//! not parse into an [`AttentionLevel`] is treated as "no change" rather than an
//! error, so unknown or future vocabulary never moves state in either direction.

use serde::{Deserialize, Serialize};

// ============================================================================
// AttentionLevel
// ============================================================================

/// Severity of a log signal, ordered from least to most important.
///
/// The derived `Ord` follows declaration order, so `Error` is the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttentionLevel {
    All,
    Spam,
    Debug,
    Trace,
    Info,
    Warn,
    Error,
}

impl AttentionLevel {
    /// Every level, most important first.
    pub const ALL_LEVELS: [AttentionLevel; 7] = [
        Self::Error,
        Self::Warn,
        Self::Info,
        Self::Trace,
        Self::Debug,
        Self::Spam,
        Self::All,
    ];

    /// Parse a severity label (case-insensitive).
    ///
    /// Returns `None` for labels outside the vocabulary.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Some(Self::Error),
            "WARN" | "WARNING" => Some(Self::Warn),
            "INFO" => Some(Self::Info),
            "TRACE" => Some(Self::Trace),
            "DEBUG" => Some(Self::Debug),
            "SPAM" => Some(Self::Spam),
            "ALL" => Some(Self::All),
            _ => None,
        }
    }

    /// Canonical label as reported on the wire.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Spam => "SPAM",
            Self::All => "ALL",
        }
    }

    /// True when `self` strictly outranks `other`.
    pub fn outranks(&self, other: AttentionLevel) -> bool {
        *self > other
    }

    /// Typed comparator: should `new` replace `old`?
    ///
    /// An unset `new` never wins; clearing goes through an explicit reset path.
    pub fn is_more_important(old: Option<AttentionLevel>, new: Option<AttentionLevel>) -> bool {
        match (old, new) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(old), Some(new)) => new.outranks(old),
        }
    }

    /// Highest level among `levels`, ignoring unset entries.
    pub fn max_of(levels: impl IntoIterator<Item = Option<AttentionLevel>>) -> Option<Self> {
        levels.into_iter().flatten().max()
    }
}

impl std::fmt::Display for AttentionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for AttentionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown attention level: {s}"))
    }
}

/// Label-level comparator for raw severity strings from the delivery layer.
///
/// - unset `old`, recognized `new` → `true`
/// - both recognized → `true` only if `new` strictly outranks `old`
/// - equal, lower, unset `new`, or any unrecognized label → `false`
pub fn is_more_important(old: Option<&str>, new: Option<&str>) -> bool {
    let new = match new {
        Some(label) => match AttentionLevel::parse(label) {
            Some(level) => level,
            None => return false,
        },
        None => return false,
    };
    match old {
        None => true,
        Some(label) => match AttentionLevel::parse(label) {
            Some(old) => new.outranks(old),
            None => false,
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        for pair in AttentionLevel::ALL_LEVELS.windows(2) {
            assert!(pair[0].outranks(pair[1]), "{} > {}", pair[0], pair[1]);
            assert!(!pair[1].outranks(pair[0]));
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(AttentionLevel::parse("error"), Some(AttentionLevel::Error));
        assert_eq!(AttentionLevel::parse("Warn"), Some(AttentionLevel::Warn));
        assert_eq!(AttentionLevel::parse(" INFO "), Some(AttentionLevel::Info));
        assert_eq!(AttentionLevel::parse("fatal"), None);
        assert_eq!(AttentionLevel::parse(""), None);
    }

    #[test]
    fn test_label_round_trips_through_parse() {
        for level in AttentionLevel::ALL_LEVELS {
            assert_eq!(AttentionLevel::parse(level.label()), Some(level));
        }
    }

    #[test]
    fn test_label_comparator_unset_old() {
        assert!(is_more_important(None, Some("DEBUG")));
        assert!(!is_more_important(None, None));
    }

    #[test]
    fn test_label_comparator_both_set() {
        assert!(is_more_important(Some("WARN"), Some("ERROR")));
        assert!(!is_more_important(Some("ERROR"), Some("WARN")));
        assert!(!is_more_important(Some("INFO"), Some("INFO")));
    }

    #[test]
    fn test_label_comparator_unrecognized_never_changes() {
        assert!(!is_more_important(Some("bogus"), Some("ERROR")));
        assert!(!is_more_important(Some("ERROR"), Some("bogus")));
        assert!(!is_more_important(None, Some("bogus")));
    }

    #[test]
    fn test_label_comparator_clearing_is_not_more_important() {
        assert!(!is_more_important(Some("ERROR"), None));
    }

    #[test]
    fn test_typed_comparator() {
        use AttentionLevel::*;
        assert!(AttentionLevel::is_more_important(None, Some(Spam)));
        assert!(AttentionLevel::is_more_important(Some(Info), Some(Warn)));
        assert!(!AttentionLevel::is_more_important(Some(Warn), Some(Warn)));
        assert!(!AttentionLevel::is_more_important(Some(Warn), None));
    }

    #[test]
    fn test_max_of_ignores_unset() {
        use AttentionLevel::*;
        assert_eq!(
            AttentionLevel::max_of([None, Some(Info), Some(Error), Some(Debug)]),
            Some(Error)
        );
        assert_eq!(AttentionLevel::max_of([None, None]), None);
    }

    #[test]
    fn test_serde_uses_uppercase_labels() {
        let json = serde_json::to_string(&AttentionLevel::Warn).unwrap();
        assert_eq!(json, "\"WARN\"");
        let level: AttentionLevel = serde_json::from_str("\"ERROR\"").unwrap();
        assert_eq!(level, AttentionLevel::Error);
    }
}
