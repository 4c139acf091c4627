// Wire shapes of the Horizon REST endpoints used by the sweeper. Only the
// fields the engine reads are modelled; everything else is ignored by serde.

use serde::Deserialize;

/// `GET /accounts/{id}`
#[derive(Debug, Deserialize)]
pub struct AccountResponse {
    pub id: String,
    /// Decimal string; Horizon encodes int64 values as strings.
    pub sequence: String,
    #[serde(default)]
    pub balances: Vec<BalanceLine>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceLine {
    pub balance: String,
    pub asset_type: String,
}

impl AccountResponse {
    /// The native balance line, if the account holds one.
    pub fn native_balance(&self) -> Option<&str> {
        self.balances
            .iter()
            .find(|line| line.asset_type == "native")
            .map(|line| line.balance.as_str())
    }
}

/// `GET /fee_stats`
#[derive(Debug, Deserialize)]
pub struct FeeStatsResponse {
    pub last_ledger_base_fee: String,
}

/// `POST /transactions` on success.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub hash: String,
}

/// Problem document returned on failed submissions.
#[derive(Debug, Deserialize)]
pub struct ProblemResponse {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub extras: Option<ProblemExtras>,
}

#[derive(Debug, Deserialize)]
pub struct ProblemExtras {
    #[serde(default)]
    pub result_codes: Option<ResultCodesBody>,
}

#[derive(Debug, Deserialize)]
pub struct ResultCodesBody {
    pub transaction: String,
    #[serde(default)]
    pub operations: Vec<String>,
}
