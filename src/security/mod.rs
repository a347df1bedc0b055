//! Data classification and routing policy
//!
//! Anything above UNCLASSIFIED must stay on the local machine. The enforcer
//! and audit sink are injected into the router rather than reached through
//! process-wide accessors, so every session owns its policy wiring.

pub mod audit;
pub mod enforcer;

pub use audit::{AuditEvent, AuditEventKind, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use enforcer::{ClassificationEnforcer, PolicyEnforcer};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Data sensitivity label, ordered from least to most sensitive
///
/// Serde goes through [`FromStr`], so config files accept the same lenient
/// spellings as the command line.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum ClassificationLevel {
    #[default]
    Unclassified,
    Cui,
    Confidential,
    Secret,
    TopSecret,
}

impl ClassificationLevel {
    pub const ALL: [ClassificationLevel; 5] = [
        ClassificationLevel::Unclassified,
        ClassificationLevel::Cui,
        ClassificationLevel::Confidential,
        ClassificationLevel::Secret,
        ClassificationLevel::TopSecret,
    ];

    /// Banner text for this level
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unclassified => "UNCLASSIFIED",
            Self::Cui => "CUI",
            Self::Confidential => "CONFIDENTIAL",
            Self::Secret => "SECRET",
            Self::TopSecret => "TOP SECRET",
        }
    }

    /// True for every level above UNCLASSIFIED
    pub fn requires_local_only(&self) -> bool {
        *self > Self::Unclassified
    }
}

impl fmt::Display for ClassificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassificationLevel {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "UNCLASSIFIED" | "U" => Ok(Self::Unclassified),
            "CUI" => Ok(Self::Cui),
            "CONFIDENTIAL" | "C" => Ok(Self::Confidential),
            "SECRET" | "S" => Ok(Self::Secret),
            "TOP SECRET" | "TOPSECRET" | "TS" => Ok(Self::TopSecret),
            _ => Err(crate::error::AppError::Config(format!(
                "unknown classification level '{}'",
                s
            ))),
        }
    }
}

impl TryFrom<String> for ClassificationLevel {
    type Error = crate::error::AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClassificationLevel> for String {
    fn from(value: ClassificationLevel) -> Self {
        value.as_str().to_string()
    }
}
