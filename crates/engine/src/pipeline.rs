use pi_sweeper_domain::{
    Amount, Keypair, LedgerClient, LedgerResult, PaymentTransaction, SignedTransaction,
    TransferPlan,
};
use tracing::{debug, info};

use crate::worker::EngineSettings;

/// Result of the Building state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Ready {
        plan: TransferPlan,
        transaction: SignedTransaction,
    },
    /// The fresh snapshot no longer covers reserve and fee.
    Insufficient { balance: Amount },
}

/// Reads the current fee and a fresh account snapshot, then signs a payment
/// sweeping whatever exceeds the reserve. Amount and sequence both come from
/// the fresh snapshot, never from the polled balance.
pub async fn build_transfer<L>(
    ledger: &L,
    keypair: &Keypair,
    settings: &EngineSettings,
    now_unix: u64,
) -> LedgerResult<BuildOutcome>
where
    L: LedgerClient + ?Sized,
{
    let fee_quote = ledger.base_fee().await?;
    let snapshot = ledger.load_account(keypair.address()).await?;
    debug!(
        base_fee = fee_quote.base_fee_units,
        sequence = snapshot.sequence_number,
        balance = %snapshot.spendable_balance,
        "loaded account for build"
    );

    let Some(plan) = TransferPlan::compute(
        snapshot.spendable_balance,
        &fee_quote,
        &settings.policy,
        &settings.destination,
    ) else {
        return Ok(BuildOutcome::Insufficient {
            balance: snapshot.spendable_balance,
        });
    };

    let transaction = PaymentTransaction::from_plan(
        keypair.address(),
        snapshot.sequence_number,
        &plan,
        now_unix,
    )
    .sign(keypair, &settings.network);

    info!(
        amount = %plan.amount,
        fee = plan.fee,
        sequence = transaction.transaction().sequence(),
        hash = %transaction.hash_hex(),
        "signed sweep transaction"
    );

    Ok(BuildOutcome::Ready { plan, transaction })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pi_sweeper_domain::{
        AccountAddress, AccountSnapshot, FeeQuote, LedgerError, NetworkId, SubmissionResult,
        SweepPolicy,
    };

    struct FixedLedger {
        balance: &'static str,
        fee: LedgerResult<FeeQuote>,
        sequence: i64,
        account_reads: AtomicUsize,
    }

    impl FixedLedger {
        fn new(balance: &'static str) -> Self {
            Self {
                balance,
                fee: Ok(FeeQuote::new(100)),
                sequence: 41,
                account_reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LedgerClient for FixedLedger {
        async fn get_balance(&self, _address: &AccountAddress) -> LedgerResult<Amount> {
            unreachable!("building never polls the balance")
        }

        async fn base_fee(&self) -> LedgerResult<FeeQuote> {
            self.fee.clone()
        }

        async fn load_account(&self, address: &AccountAddress) -> LedgerResult<AccountSnapshot> {
            self.account_reads.fetch_add(1, Ordering::SeqCst);
            Ok(AccountSnapshot {
                address: address.clone(),
                sequence_number: self.sequence,
                spendable_balance: Amount::parse(self.balance).unwrap(),
            })
        }

        async fn submit(&self, _transaction: &SignedTransaction) -> SubmissionResult {
            unreachable!("building never submits")
        }
    }

    fn keypair() -> Keypair {
        Keypair::from_seed([7u8; 32])
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            policy: SweepPolicy::default(),
            destination: AccountAddress::from_public_key([9u8; 32]),
            network: NetworkId::from_passphrase("Pi Testnet"),
            explorer_base: "https://horizon.example".into(),
            asset_label: "Pi".into(),
        }
    }

    #[tokio::test]
    async fn signs_sweep_for_fresh_snapshot() {
        let ledger = FixedLedger::new("5.0");
        let keypair = keypair();
        let settings = settings();

        let outcome = build_transfer(&ledger, &keypair, &settings, 1_700_000_000)
            .await
            .expect("build succeeds");

        let BuildOutcome::Ready { plan, transaction } = outcome else {
            panic!("expected a signed transaction");
        };
        assert_eq!(plan.amount.to_string(), "3.9999800");
        assert_eq!(plan.fee, 200);

        let tx = transaction.transaction();
        assert_eq!(tx.source(), keypair.address());
        assert_eq!(tx.destination(), &settings.destination);
        assert_eq!(tx.sequence(), 42);
        assert_eq!(tx.operation_count(), 1);
        assert_eq!(tx.time_bounds().max_time, 1_700_000_030);
        assert_eq!(ledger.account_reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reports_insufficient_balance() {
        let ledger = FixedLedger::new("1.00002");
        let outcome = build_transfer(&ledger, &keypair(), &settings(), 0)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            BuildOutcome::Insufficient {
                balance: Amount::parse("1.00002").unwrap()
            }
        );
    }

    #[tokio::test]
    async fn fee_errors_stop_before_account_read() {
        let mut ledger = FixedLedger::new("5.0");
        ledger.fee = Err(LedgerError::RateLimited);

        let err = build_transfer(&ledger, &keypair(), &settings(), 0)
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(ledger.account_reads.load(Ordering::SeqCst), 0);
    }
}
