use serde::{Deserialize, Serialize};
use std::fmt;

/// A recognized hand-sign label. Tokens are compared for equality only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SignToken(String);

impl SignToken {
    pub const IDLE: &'static str = "idle";
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(label: impl AsRef<str>) -> Self {
        Self(label.as_ref().trim().to_lowercase())
    }

    pub fn idle() -> Self {
        Self(Self::IDLE.to_string())
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    /// `idle` and `unknown` never match a sequence target.
    pub fn is_reserved(&self) -> bool {
        self.0 == Self::IDLE || self.0 == Self::UNKNOWN || self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased with `-`/`_` folded to spaces and whitespace collapsed.
    pub fn normalized(&self) -> String {
        normalize_label(&self.0)
    }
}

pub fn normalize_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .replace(&['-', '_'][..], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl From<String> for SignToken {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SignToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<SignToken> for String {
    fn from(value: SignToken) -> Self {
        value.0
    }
}

impl fmt::Display for SignToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_case_insensitive() {
        assert_eq!(SignToken::new(" Ram "), SignToken::new("ram"));
    }

    #[test]
    fn reserved_tokens() {
        assert!(SignToken::idle().is_reserved());
        assert!(SignToken::new("Unknown").is_reserved());
        assert!(!SignToken::new("tiger").is_reserved());
    }

    #[test]
    fn normalization_folds_separators() {
        assert_eq!(normalize_label("Kage-Bunshin_no  Jutsu"), "kage bunshin no jutsu");
    }
}
