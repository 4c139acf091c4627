use std::mem;

use chrono::Utc;
use metrics::{counter, gauge};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use pi_sweeper_domain::{
    config::{ConfigError, SweeperConfig},
    derive_keypair,
    services::telemetry::TelemetryError,
    AccountAddress, Amount, KeyError, Keypair, LedgerClient, LedgerError, LedgerResult, NetworkId,
    Notifier, SignedTransaction, SubmissionResult, SweepPolicy, TransferPlan,
};

use crate::{
    notify::{invalid_phrase_message, rate_limited_message, startup_failure_message, sweep_message},
    pipeline::{build_transfer, BuildOutcome},
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("ledger api rate limited the sweeper")]
    RateLimited,
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("http client error: {0}")]
    Http(String),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

impl From<reqwest::Error> for EngineError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.without_url().to_string())
    }
}

impl EngineError {
    /// Process exit status for this failure. Every variant is non-zero.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::RateLimited => 2,
            _ => 1,
        }
    }
}

/// Parameters the engine needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub policy: SweepPolicy,
    pub destination: AccountAddress,
    pub network: NetworkId,
    /// Base URL used for transaction links in notifications.
    pub explorer_base: String,
    pub asset_label: String,
}

impl EngineSettings {
    pub fn from_config(config: &SweeperConfig) -> Self {
        Self {
            policy: config.policy().clone(),
            destination: config.destination().clone(),
            network: NetworkId::from_passphrase(config.network_passphrase()),
            explorer_base: config.horizon_url().to_string(),
            asset_label: config.asset_label().to_string(),
        }
    }

    fn transaction_link(&self, hash: &str) -> String {
        format!(
            "{}/transactions/{}",
            self.explorer_base.trim_end_matches('/'),
            hash
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReceipt {
    pub transaction_hash: String,
    pub amount: Amount,
    pub destination: AccountAddress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Polling,
    Evaluating {
        balance: Amount,
    },
    Building,
    Submitting {
        transaction: SignedTransaction,
        plan: TransferPlan,
    },
    Done {
        receipt: SweepReceipt,
    },
}

/// Watches one account and sweeps it once to the configured destination.
pub struct TransferEngine<L, N> {
    ledger: L,
    notifier: N,
    keypair: Keypair,
    settings: EngineSettings,
    state: EngineState,
}

impl<L, N> TransferEngine<L, N>
where
    L: LedgerClient,
    N: Notifier,
{
    pub fn new(ledger: L, notifier: N, keypair: Keypair, settings: EngineSettings) -> Self {
        Self {
            ledger,
            notifier,
            keypair,
            settings,
            state: EngineState::Polling,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn source(&self) -> &AccountAddress {
        self.keypair.address()
    }

    /// Drives the state machine until a sweep is confirmed or a fatal error
    /// (rate limiting) stops it.
    pub async fn run(&mut self) -> Result<SweepReceipt, EngineError> {
        info!(
            source = %self.source(),
            destination = %self.settings.destination,
            threshold = %self.settings.policy.activation_threshold,
            "sweeper started"
        );

        loop {
            if let EngineState::Done { receipt } = &self.state {
                return Ok(receipt.clone());
            }
            self.step().await?;
        }
    }

    /// Performs a single transition. Returning to `Polling` waits one poll
    /// interval; `Done` is absorbing.
    pub async fn step(&mut self) -> Result<(), EngineError> {
        let next = match mem::replace(&mut self.state, EngineState::Polling) {
            EngineState::Polling => self.poll().await?,
            EngineState::Evaluating { balance } => self.evaluate(balance),
            EngineState::Building => self.build().await?,
            EngineState::Submitting { transaction, plan } => {
                self.submit(transaction, plan).await
            }
            done @ EngineState::Done { .. } => done,
        };

        if next == EngineState::Polling {
            sleep(self.settings.policy.poll_interval).await;
        }
        self.state = next;
        Ok(())
    }

    async fn poll(&self) -> Result<EngineState, EngineError> {
        match self.ledger.get_balance(self.keypair.address()).await {
            Ok(balance) => {
                counter!("sweeper_polls_total", "result" => "ok").increment(1);
                gauge!("sweeper_last_balance_stroops").set(balance.stroops() as f64);
                debug!(%balance, "polled balance");
                Ok(EngineState::Evaluating { balance })
            }
            Err(err) => {
                counter!("sweeper_polls_total", "result" => "error").increment(1);
                self.recover(err, "balance poll").await
            }
        }
    }

    fn evaluate(&self, balance: Amount) -> EngineState {
        if self.settings.policy.should_activate(balance) {
            info!(%balance, "balance above activation threshold");
            EngineState::Building
        } else {
            debug!(
                %balance,
                threshold = %self.settings.policy.activation_threshold,
                "balance below activation threshold"
            );
            EngineState::Polling
        }
    }

    async fn build(&self) -> Result<EngineState, EngineError> {
        match build_transfer(&self.ledger, &self.keypair, &self.settings, unix_now()).await {
            Ok(BuildOutcome::Ready { plan, transaction }) => {
                Ok(EngineState::Submitting { transaction, plan })
            }
            Ok(BuildOutcome::Insufficient { balance }) => {
                info!(%balance, "insufficient after reserve and fee");
                Ok(EngineState::Polling)
            }
            Err(err) => self.recover(err, "build").await,
        }
    }

    async fn submit(&self, transaction: SignedTransaction, plan: TransferPlan) -> EngineState {
        match self.ledger.submit(&transaction).await {
            SubmissionResult::Success { transaction_hash } => {
                counter!("sweeper_submissions_total", "result" => "success").increment(1);
                info!(hash = %transaction_hash, amount = %plan.amount, "sweep confirmed");

                let link = self.settings.transaction_link(&transaction_hash);
                let text = sweep_message(
                    plan.amount,
                    &self.settings.asset_label,
                    self.source(),
                    &plan.destination,
                    &link,
                );
                self.notifier.notify(&text).await;

                EngineState::Done {
                    receipt: SweepReceipt {
                        transaction_hash,
                        amount: plan.amount,
                        destination: plan.destination,
                    },
                }
            }
            SubmissionResult::Rejected { result_codes } => {
                counter!("sweeper_submissions_total", "result" => "rejected").increment(1);
                warn!(codes = %result_codes, hash = %transaction.hash_hex(), "submission rejected");
                EngineState::Polling
            }
            SubmissionResult::TransportError { cause } => {
                counter!("sweeper_submissions_total", "result" => "transport_error").increment(1);
                warn!(%cause, "submission did not complete");
                EngineState::Polling
            }
        }
    }

    async fn recover(&self, err: LedgerError, stage: &str) -> Result<EngineState, EngineError> {
        if err.is_rate_limited() {
            error!(stage, "ledger api returned 429; stopping");
            self.notifier.notify(&rate_limited_message()).await;
            return Err(EngineError::RateLimited);
        }

        warn!(error = %err, stage, "ledger call failed; retrying");
        Ok(EngineState::Polling)
    }
}

/// Derives the signing key, connects to the ledger through `connect` and runs
/// the engine until the sweep lands. Startup failures are reported through
/// `notifier`; a bad recovery phrase stops before `connect` is called.
pub async fn launch_sweeper<L, N, F>(
    config: &SweeperConfig,
    notifier: N,
    connect: F,
) -> Result<SweepReceipt, EngineError>
where
    L: LedgerClient,
    N: Notifier,
    F: FnOnce(&SweeperConfig) -> LedgerResult<L>,
{
    let keypair = match derive_keypair(config.recovery_phrase(), config.derivation_path()) {
        Ok(keypair) => keypair,
        Err(err @ KeyError::InvalidRecoveryPhrase) => {
            error!("invalid recovery phrase");
            notifier.notify(&invalid_phrase_message()).await;
            return Err(err.into());
        }
        Err(err) => {
            error!(error = %err, "key derivation failed");
            notifier.notify(&startup_failure_message(&err)).await;
            return Err(err.into());
        }
    };

    let ledger = match connect(config) {
        Ok(ledger) => ledger,
        Err(err) => {
            error!(error = %err, "ledger client unavailable");
            notifier.notify(&startup_failure_message(&err)).await;
            return Err(err.into());
        }
    };

    let settings = EngineSettings::from_config(config);
    let mut engine = TransferEngine::new(ledger, notifier, keypair, settings);
    engine.run().await
}

fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}
