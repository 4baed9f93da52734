//! Identifiers used throughout the Stratum workflow engine.
//!
//! `WorkflowId`, `BotId`, and `StrategyId` are caller-supplied strings (a
//! workflow author names their own strategy); `ExecutionId` is minted by the
//! runtime and doubles as the correlation id for everything done on behalf
//! of that execution (§3).

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an arbitrary caller-supplied string as this id type.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the id, returning the underlying string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(WorkflowId, "The user-assigned identifier of a workflow definition.");
string_id!(BotId, "The identifier of the bot this execution runs on behalf of.");
string_id!(StrategyId, "The identifier of the strategy this execution belongs to.");

/// An execution identifier, also the correlation id for logs and events.
///
/// Formed deterministically as `exec_{workflow_id}_{8-hex-chars}` (§3) and
/// unique within a single running process.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Mint a fresh execution id for the given workflow.
    ///
    /// The 8-hex suffix comes from the low 32 bits of a random UUID; this is
    /// not cryptographically meaningful, it only needs to be unique enough
    /// that two concurrent executions of the same workflow don't collide.
    #[must_use]
    pub fn new(workflow_id: &WorkflowId) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("exec_{}_{}", workflow_id.as_str(), &suffix[..8]))
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ExecutionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_id_has_expected_shape() {
        let workflow_id = WorkflowId::new("arb_btc");
        let execution_id = ExecutionId::new(&workflow_id);
        assert!(execution_id.as_str().starts_with("exec_arb_btc_"));
        let suffix = execution_id.as_str().rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn execution_ids_are_unique() {
        let workflow_id = WorkflowId::new("arb_btc");
        let a = ExecutionId::new(&workflow_id);
        let b = ExecutionId::new(&workflow_id);
        assert_ne!(a, b);
    }

    #[test]
    fn workflow_id_display_roundtrip() {
        let id = WorkflowId::new("arb_btc");
        assert_eq!(id.to_string(), "arb_btc");
        assert_eq!(id.as_str(), "arb_btc");
    }

    #[test]
    fn ids_serde_roundtrip() {
        let id = WorkflowId::new("arb_btc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"arb_btc\"");
        let back: WorkflowId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
