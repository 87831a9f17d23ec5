//! Error taxonomy for the liquidation bot's core crate.
//!
//! Orchestration code (main.rs, Supervisor) keeps using `anyhow::Result` with
//! `?` and `#[from]` conversions at crate boundaries, matching the rest of
//! the codebase. This module defines the structured variants that matter for
//! *decisions*, not just logging: whether to retry, whether to back off,
//! whether to treat a position as unbuildable this round, or whether to stop
//! the bot entirely.

use thiserror::Error;

/// Why a position couldn't be turned into a submittable liquidation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum UnbuildableReason {
    /// No collateral/debt pair exists to build a plan against (no
    /// collateral to seize, no debt to cover, or not liquidatable under the
    /// authoritative HF).
    #[error("no viable liquidation plan")]
    NoViablePlan,
    /// The close-factor-adjusted debt to cover is below `minDebtUsd`.
    #[error("debt to cover is below the minimum threshold")]
    DebtBelowThreshold,
    /// Expected profit (liquidation bonus on covered debt) is below
    /// `minProfitUsd`.
    #[error("expected profit is below the minimum threshold")]
    ProfitBelowThreshold,
}

/// Errors produced while building or executing a liquidation.
#[derive(Debug, Error)]
pub enum LiquidatorError {
    #[error("position {user} is not buildable: {reason}")]
    Unbuildable {
        user: String,
        reason: UnbuildableReason,
    },

    #[error("arithmetic overflow computing {context}")]
    ArithmeticOverflow { context: String },

    #[error("lock contention on {resource}, gave up after {attempts} attempts")]
    LockContention { resource: String, attempts: u32 },

    #[error("suspicious scaling detected for {asset}: {detail}")]
    SuspiciousScaling { asset: String, detail: String },

    #[error("fatal: invariant broken: {0}")]
    Fatal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LiquidatorError {
    /// Whether this error should trigger a full process shutdown rather than
    /// being logged and skipped for this position/cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LiquidatorError::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let fatal = LiquidatorError::Fatal("tracker lost all positions".into());
        assert!(fatal.is_fatal());

        let not_fatal = LiquidatorError::Unbuildable {
            user: "0xabc".into(),
            reason: UnbuildableReason::NoViablePlan,
        };
        assert!(!not_fatal.is_fatal());
    }

    #[test]
    fn test_unbuildable_reason_display() {
        assert_eq!(
            UnbuildableReason::DebtBelowThreshold.to_string(),
            "debt to cover is below the minimum threshold"
        );
    }
}
