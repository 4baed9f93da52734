//! The `RiskLimitTable` registry (§3, §4.6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One registered risk limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskLimit {
    /// The configured limit. Negative for a "floor" limit like
    /// `daily_loss_limit`; positive for a "ceiling" limit.
    pub limit_value: f64,
    /// The most recent value reported via `CheckLimit`.
    pub current_value: f64,
    /// Whether a violation should auto-transition the controller to `Halt`.
    pub auto_halt: bool,
}

impl RiskLimit {
    /// Whether `current_value` violates `limit_value`.
    ///
    /// For a negative limit (a loss floor, e.g. `daily_loss_limit`),
    /// violation is `current_value <= limit_value` — more negative than the
    /// floor. For a non-negative limit (a ceiling), violation is
    /// `current_value >= limit_value` (§4.6).
    #[must_use]
    pub fn is_violated(&self) -> bool {
        if self.limit_value < 0.0 {
            self.current_value <= self.limit_value
        } else {
            self.current_value >= self.limit_value
        }
    }

    /// How much of the limit has been used, as a fraction. For a ceiling
    /// limit this is `current / limit`; for a floor limit (negative) it is
    /// the same ratio, which rises toward `1.0` as losses deepen.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.limit_value == 0.0 {
            return 0.0;
        }
        self.current_value / self.limit_value
    }
}

/// The outcome of one `CheckLimit` call (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// `true` unless this check crossed into violation.
    pub ok: bool,
    /// `current_value / limit_value` at the time of the check.
    pub utilization: f64,
}

/// The registry of named risk limits, keyed by limit name
/// (e.g. `"daily_loss"`, `"max_position_size"`).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RiskLimitTable {
    limits: HashMap<String, RiskLimit>,
}

impl RiskLimitTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) a limit. Re-registering resets
    /// `current_value` to `0.0`.
    pub fn register(&mut self, name: impl Into<String>, limit_value: f64, auto_halt: bool) {
        self.limits.insert(
            name.into(),
            RiskLimit {
                limit_value,
                current_value: 0.0,
                auto_halt,
            },
        );
    }

    /// Update `current_value` for `name` and report whether this crossed
    /// into violation. Returns `None` if `name` was never registered.
    #[must_use]
    pub fn check(&mut self, name: &str, current_value: f64) -> Option<(CheckOutcome, RiskLimit)> {
        let limit = self.limits.get_mut(name)?;
        limit.current_value = current_value;
        let violated = limit.is_violated();
        let outcome = CheckOutcome {
            ok: !violated,
            utilization: limit.utilization(),
        };
        Some((outcome, *limit))
    }

    /// A registered limit's current configuration and value, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RiskLimit> {
        self.limits.get(name)
    }

    /// Every registered limit, by name.
    #[must_use]
    pub fn all(&self) -> &HashMap<String, RiskLimit> {
        &self.limits
    }
}
