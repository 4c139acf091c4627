use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use pi_sweeper_domain::{
    AccountAddress, AccountSnapshot, Amount, FeeQuote, LedgerClient, LedgerError, LedgerResult,
    ResultCodes, SignedTransaction, SubmissionResult,
};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

mod types;

pub use types::{AccountResponse, FeeStatsResponse, ProblemResponse, SubmitResponse};

/// `LedgerClient` backed by a Horizon REST endpoint.
pub struct HorizonLedger {
    client: Client,
    base_url: String,
}

impl HorizonLedger {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> LedgerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LedgerError::transport)?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    async fn get_json<T>(&self, path: &str) -> LedgerResult<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| LedgerError::transport(err.without_url()))?;

        classify_read_status(response.status())?;
        response
            .json::<T>()
            .await
            .map_err(|err| LedgerError::Decode(err.without_url().to_string()))
    }

    async fn fetch_account(&self, address: &AccountAddress) -> LedgerResult<AccountResponse> {
        let account = self
            .get_json::<AccountResponse>(&format!("/accounts/{address}"))
            .await;
        counter!(
            "sweeper_ledger_requests_total",
            "endpoint" => "accounts",
            "result" => if account.is_ok() { "ok" } else { "error" }
        )
        .increment(1);
        account
    }
}

#[async_trait]
impl LedgerClient for HorizonLedger {
    async fn get_balance(&self, address: &AccountAddress) -> LedgerResult<Amount> {
        let account = self.fetch_account(address).await?;
        native_balance(&account)
    }

    async fn base_fee(&self) -> LedgerResult<FeeQuote> {
        let stats = self.get_json::<FeeStatsResponse>("/fee_stats").await?;
        fee_quote_from_stats(&stats)
    }

    async fn load_account(&self, address: &AccountAddress) -> LedgerResult<AccountSnapshot> {
        let account = self.fetch_account(address).await?;
        snapshot_from_account(address, &account)
    }

    async fn submit(&self, transaction: &SignedTransaction) -> SubmissionResult {
        let url = format!("{}/transactions", self.base_url);
        debug!(hash = %transaction.hash_hex(), "submitting transaction");

        let response = match self
            .client
            .post(&url)
            .form(&[("tx", transaction.envelope_xdr())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                return SubmissionResult::TransportError {
                    cause: err.without_url().to_string(),
                }
            }
        };

        let status = response.status();
        match response.text().await {
            Ok(body) => classify_submission(status, &body),
            Err(err) => SubmissionResult::TransportError {
                cause: err.without_url().to_string(),
            },
        }
    }
}

fn classify_read_status(status: StatusCode) -> LedgerResult<()> {
    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(LedgerError::RateLimited),
        StatusCode::NOT_FOUND => Err(LedgerError::AccountNotFound),
        status if !status.is_success() => Err(LedgerError::Transport(format!(
            "horizon returned {status}"
        ))),
        _ => Ok(()),
    }
}

/// Accounts without a native balance line are treated as empty.
fn native_balance(account: &AccountResponse) -> LedgerResult<Amount> {
    match account.native_balance() {
        Some(balance) => Amount::parse(balance).map_err(|err| LedgerError::Decode(err.to_string())),
        None => Ok(Amount::ZERO),
    }
}

fn snapshot_from_account(
    address: &AccountAddress,
    account: &AccountResponse,
) -> LedgerResult<AccountSnapshot> {
    if account.id != address.as_str() {
        return Err(LedgerError::Decode(format!(
            "requested {address} but horizon returned {}",
            account.id
        )));
    }

    let sequence_number = account
        .sequence
        .parse::<i64>()
        .map_err(|err| LedgerError::Decode(format!("invalid sequence: {err}")))?;

    Ok(AccountSnapshot {
        address: address.clone(),
        sequence_number,
        spendable_balance: native_balance(account)?,
    })
}

fn fee_quote_from_stats(stats: &FeeStatsResponse) -> LedgerResult<FeeQuote> {
    stats
        .last_ledger_base_fee
        .trim()
        .parse::<u32>()
        .map(FeeQuote::new)
        .map_err(|err| LedgerError::Decode(format!("invalid base fee: {err}")))
}

fn classify_submission(status: StatusCode, body: &str) -> SubmissionResult {
    if status.is_success() {
        return match serde_json::from_str::<SubmitResponse>(body) {
            Ok(accepted) => SubmissionResult::Success {
                transaction_hash: accepted.hash,
            },
            Err(err) => SubmissionResult::TransportError {
                cause: format!("unreadable submission response: {err}"),
            },
        };
    }

    let problem = serde_json::from_str::<ProblemResponse>(body).ok();
    if status == StatusCode::BAD_REQUEST {
        if let Some(codes) = problem
            .as_ref()
            .and_then(|problem| problem.extras.as_ref())
            .and_then(|extras| extras.result_codes.as_ref())
        {
            return SubmissionResult::Rejected {
                result_codes: ResultCodes {
                    transaction: codes.transaction.clone(),
                    operations: codes.operations.clone(),
                },
            };
        }
    }

    let reason = problem
        .and_then(|problem| problem.detail.or(problem.title))
        .unwrap_or_else(|| "no problem details".to_string());
    SubmissionResult::TransportError {
        cause: format!("horizon returned {status}: {reason}"),
    }
}
