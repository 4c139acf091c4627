//! Data structures shared between the ledger adapters and the transfer engine.

mod amount;

use std::{fmt, time::Duration};

pub use amount::{Amount, AmountError, AMOUNT_DECIMALS, STROOPS_PER_UNIT};

use crate::address::AccountAddress;

/// Validity window attached to every built transaction.
pub const TRANSFER_TIMEOUT_SECS: u64 = 30;

/// Point-in-time view of the watched account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub address: AccountAddress,
    pub sequence_number: i64,
    pub spendable_balance: Amount,
}

/// Current per-operation base fee, in stroops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub base_fee_units: u32,
}

impl FeeQuote {
    pub fn new(base_fee_units: u32) -> Self {
        Self { base_fee_units }
    }

    /// Total fee paid for a single-operation transaction.
    pub fn total_fee(&self, multiplier: u32) -> u32 {
        self.base_fee_units.saturating_mul(multiplier)
    }
}

/// Knobs controlling when and how much the engine sweeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPolicy {
    pub poll_interval: Duration,
    /// Balance must be strictly greater than this before a build is attempted.
    pub activation_threshold: Amount,
    /// Minimum balance the account keeps; never swept.
    pub reserve: Amount,
    pub fee_multiplier: u32,
}

impl SweepPolicy {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
    pub const DEFAULT_ACTIVATION_THRESHOLD: Amount = Amount::from_stroops(10_010_000);
    pub const DEFAULT_RESERVE: Amount = Amount::from_stroops(STROOPS_PER_UNIT);
    pub const DEFAULT_FEE_MULTIPLIER: u32 = 2;

    pub fn should_activate(&self, balance: Amount) -> bool {
        balance > self.activation_threshold
    }
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            activation_threshold: Self::DEFAULT_ACTIVATION_THRESHOLD,
            reserve: Self::DEFAULT_RESERVE,
            fee_multiplier: Self::DEFAULT_FEE_MULTIPLIER,
        }
    }
}

/// A sweep that is worth submitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub amount: Amount,
    pub destination: AccountAddress,
    pub fee: u32,
    pub timeout_seconds: u64,
}

impl TransferPlan {
    /// `balance - reserve - fee`, or `None` when nothing would be left to send.
    pub fn compute(
        balance: Amount,
        fee_quote: &FeeQuote,
        policy: &SweepPolicy,
        destination: &AccountAddress,
    ) -> Option<Self> {
        let fee = fee_quote.total_fee(policy.fee_multiplier);
        let amount = balance
            .checked_sub(policy.reserve)?
            .checked_sub(Amount::from_stroops(i64::from(fee)))?;

        if !amount.is_positive() {
            return None;
        }

        Some(Self {
            amount,
            destination: destination.clone(),
            fee,
            timeout_seconds: TRANSFER_TIMEOUT_SECS,
        })
    }
}

/// Structured rejection reasons reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultCodes {
    pub transaction: String,
    pub operations: Vec<String>,
}

impl fmt::Display for ResultCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operations.is_empty() {
            write!(f, "{}", self.transaction)
        } else {
            write!(f, "{} [{}]", self.transaction, self.operations.join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    Success { transaction_hash: String },
    Rejected { result_codes: ResultCodes },
    TransportError { cause: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination() -> AccountAddress {
        AccountAddress::from_public_key([9u8; 32])
    }

    fn policy() -> SweepPolicy {
        SweepPolicy::default()
    }

    #[test]
    fn computes_sweep_amount_after_reserve_and_fee() {
        let balance = Amount::parse("5.0").unwrap();
        let plan = TransferPlan::compute(balance, &FeeQuote::new(100), &policy(), &destination())
            .expect("plan constructed");

        assert_eq!(plan.fee, 200);
        assert_eq!(plan.amount.to_string(), "3.9999800");
        assert_eq!(plan.destination, destination());
        assert_eq!(plan.timeout_seconds, TRANSFER_TIMEOUT_SECS);
    }

    #[test]
    fn no_plan_when_balance_only_covers_reserve_and_fee() {
        let fee = FeeQuote::new(100);
        let floor = Amount::from_stroops(STROOPS_PER_UNIT + 200);

        assert!(TransferPlan::compute(floor, &fee, &policy(), &destination()).is_none());
        assert!(TransferPlan::compute(Amount::ZERO, &fee, &policy(), &destination()).is_none());
        assert!(TransferPlan::compute(
            Amount::from_stroops(floor.stroops() - 1),
            &fee,
            &policy(),
            &destination()
        )
        .is_none());

        let just_above = Amount::from_stroops(floor.stroops() + 1);
        let plan = TransferPlan::compute(just_above, &fee, &policy(), &destination())
            .expect("one stroop left");
        assert_eq!(plan.amount, Amount::from_stroops(1));
    }

    #[test]
    fn amount_matches_formula_across_balances() {
        let fee = FeeQuote::new(100);
        for stroops in [10_000_201_i64, 10_005_000, 25_000_000, 1_234_567_890] {
            let balance = Amount::from_stroops(stroops);
            let plan = TransferPlan::compute(balance, &fee, &policy(), &destination())
                .expect("above floor");
            assert_eq!(plan.amount.stroops(), stroops - STROOPS_PER_UNIT - 200);
            assert!(plan.amount.is_positive());
        }
    }

    #[test]
    fn small_excess_over_reserve_is_swept_only_past_fee() {
        let balance = Amount::parse("1.0005").unwrap();
        let plan = TransferPlan::compute(balance, &FeeQuote::new(100), &policy(), &destination())
            .expect("0.0005 minus fee remains");
        assert_eq!(plan.amount.to_string(), "0.0004800");

        let huge_fee = FeeQuote::new(2_500);
        assert!(TransferPlan::compute(balance, &huge_fee, &policy(), &destination()).is_none());
    }

    #[test]
    fn fee_multiplier_scales_fee() {
        let mut policy = policy();
        policy.fee_multiplier = 3;
        let plan = TransferPlan::compute(
            Amount::parse("2").unwrap(),
            &FeeQuote::new(100),
            &policy,
            &destination(),
        )
        .unwrap();
        assert_eq!(plan.fee, 300);
        assert_eq!(plan.amount.stroops(), STROOPS_PER_UNIT - 300);
    }

    #[test]
    fn activation_requires_strictly_exceeding_threshold() {
        let policy = policy();
        assert!(!policy.should_activate(policy.activation_threshold));
        assert!(policy.should_activate(Amount::from_stroops(
            policy.activation_threshold.stroops() + 1
        )));
    }

    #[test]
    fn result_codes_render_operations() {
        let codes = ResultCodes {
            transaction: "tx_failed".into(),
            operations: vec!["op_underfunded".into()],
        };
        assert_eq!(codes.to_string(), "tx_failed [op_underfunded]");
    }
}
