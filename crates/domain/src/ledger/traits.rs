use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    address::AccountAddress,
    model::{AccountSnapshot, Amount, FeeQuote, SubmissionResult},
    transaction::SignedTransaction,
};

/// Common result alias for ledger reads.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger api is rate limiting requests")]
    RateLimited,
    #[error("account not found on ledger")]
    AccountNotFound,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected ledger response: {0}")]
    Decode(String),
}

impl LedgerError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// Read/submit access to the remote ledger. Implementations never retry.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_balance(&self, address: &AccountAddress) -> LedgerResult<Amount>;
    async fn base_fee(&self) -> LedgerResult<FeeQuote>;
    async fn load_account(&self, address: &AccountAddress) -> LedgerResult<AccountSnapshot>;
    async fn submit(&self, transaction: &SignedTransaction) -> SubmissionResult;
}

/// Best-effort outbound messages. Delivery failures stay inside the notifier.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str);
}

#[async_trait]
impl<T> LedgerClient for Arc<T>
where
    T: LedgerClient + ?Sized,
{
    async fn get_balance(&self, address: &AccountAddress) -> LedgerResult<Amount> {
        (**self).get_balance(address).await
    }

    async fn base_fee(&self) -> LedgerResult<FeeQuote> {
        (**self).base_fee().await
    }

    async fn load_account(&self, address: &AccountAddress) -> LedgerResult<AccountSnapshot> {
        (**self).load_account(address).await
    }

    async fn submit(&self, transaction: &SignedTransaction) -> SubmissionResult {
        (**self).submit(transaction).await
    }
}

#[async_trait]
impl<T> Notifier for Arc<T>
where
    T: Notifier + ?Sized,
{
    async fn notify(&self, text: &str) {
        (**self).notify(text).await
    }
}
