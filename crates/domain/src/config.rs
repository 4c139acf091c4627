//! Environment-driven configuration for the sweeper binaries.

use std::{env, time::Duration};

use thiserror::Error;

use crate::{
    address::{AccountAddress, AddressError},
    keys::{DerivationPath, KeyError, RecoveryPhrase, DEFAULT_DERIVATION_PATH},
    model::{Amount, AmountError, SweepPolicy},
};

pub const DEFAULT_HORIZON_URL: &str = "https://api.mainnet.minepi.com";
pub const DEFAULT_NETWORK_PASSPHRASE: &str = "Pi Network";
pub const DEFAULT_ASSET_LABEL: &str = "Pi";
pub const DEFAULT_HORIZON_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the sweeper needs to watch one account and pay one destination.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    recovery_phrase: RecoveryPhrase,
    destination: AccountAddress,
    derivation_path: DerivationPath,
    horizon_url: String,
    network_passphrase: String,
    horizon_timeout: Duration,
    asset_label: String,
    policy: SweepPolicy,
}

impl SweeperConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// process variables. Missing or malformed entries surface as
    /// `ConfigError`; all of them are fatal at startup.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let recovery_phrase = RecoveryPhrase::new(get_required_var("MNEMONIC")?);
        let destination = AccountAddress::parse(&get_required_var("RECEIVER_ADDRESS")?)
            .map_err(|source| ConfigError::InvalidAddress {
                key: "RECEIVER_ADDRESS",
                source,
            })?;
        let derivation_path = DerivationPath::parse(
            &get_optional_var("DERIVATION_PATH")
                .unwrap_or_else(|| DEFAULT_DERIVATION_PATH.to_string()),
        )
        .map_err(|source| ConfigError::InvalidDerivationPath { source })?;

        let horizon_url = get_optional_var("HORIZON_URL")
            .unwrap_or_else(|| DEFAULT_HORIZON_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let network_passphrase = get_optional_var("NETWORK_PASSPHRASE")
            .unwrap_or_else(|| DEFAULT_NETWORK_PASSPHRASE.to_string());
        let horizon_timeout = get_optional_number::<u64>("HORIZON_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HORIZON_TIMEOUT);
        let asset_label =
            get_optional_var("ASSET_LABEL").unwrap_or_else(|| DEFAULT_ASSET_LABEL.to_string());

        let policy = SweepPolicy {
            poll_interval: get_optional_number::<u64>("POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(SweepPolicy::DEFAULT_POLL_INTERVAL),
            activation_threshold: get_optional_amount("ACTIVATION_THRESHOLD")?
                .unwrap_or(SweepPolicy::DEFAULT_ACTIVATION_THRESHOLD),
            reserve: get_optional_amount("RESERVE")?.unwrap_or(SweepPolicy::DEFAULT_RESERVE),
            fee_multiplier: get_optional_number::<u32>("FEE_MULTIPLIER")?
                .unwrap_or(SweepPolicy::DEFAULT_FEE_MULTIPLIER),
        };
        if policy.fee_multiplier == 0 {
            return Err(ConfigError::OutOfRange {
                key: "FEE_MULTIPLIER",
                reason: "must be at least 1",
            });
        }

        Ok(Self {
            recovery_phrase,
            destination,
            derivation_path,
            horizon_url,
            network_passphrase,
            horizon_timeout,
            asset_label,
            policy,
        })
    }

    /// Configuration for `destination` with every optional setting at its default.
    pub fn new(recovery_phrase: RecoveryPhrase, destination: AccountAddress) -> Self {
        Self {
            recovery_phrase,
            destination,
            derivation_path: DerivationPath::default(),
            horizon_url: DEFAULT_HORIZON_URL.to_string(),
            network_passphrase: DEFAULT_NETWORK_PASSPHRASE.to_string(),
            horizon_timeout: DEFAULT_HORIZON_TIMEOUT,
            asset_label: DEFAULT_ASSET_LABEL.to_string(),
            policy: SweepPolicy::default(),
        }
    }

    pub fn recovery_phrase(&self) -> &RecoveryPhrase {
        &self.recovery_phrase
    }

    pub fn destination(&self) -> &AccountAddress {
        &self.destination
    }

    pub fn derivation_path(&self) -> &DerivationPath {
        &self.derivation_path
    }

    pub fn horizon_url(&self) -> &str {
        &self.horizon_url
    }

    pub fn network_passphrase(&self) -> &str {
        &self.network_passphrase
    }

    pub fn horizon_timeout(&self) -> Duration {
        self.horizon_timeout
    }

    pub fn asset_label(&self) -> &str {
        &self.asset_label
    }

    pub fn policy(&self) -> &SweepPolicy {
        &self.policy
    }
}

/// Telegram credentials; loaded separately so startup failures can still be
/// reported to the channel.
#[derive(Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    token: String,
    chat_id: String,
}

impl TelegramConfig {
    /// Returns `None` unless both `TELEGRAM_TOKEN` and `TELEGRAM_CHAT_ID` are set.
    pub fn load_from_env() -> Result<Option<Self>, ConfigError> {
        hydrate_env_file()?;

        match (
            get_optional_var("TELEGRAM_TOKEN"),
            get_optional_var("TELEGRAM_CHAT_ID"),
        ) {
            (Some(token), Some(chat_id)) => Ok(Some(Self { token, chat_id })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(ConfigError::MissingVar {
                key: "TELEGRAM_CHAT_ID",
            }),
            (None, Some(_)) => Err(ConfigError::MissingVar {
                key: "TELEGRAM_TOKEN",
            }),
        }
    }

    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            chat_id: chat_id.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"***")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(ConfigError::MissingVar { key })
            } else {
                Ok(trimmed.to_string())
            }
        }
        Err(_) => Err(ConfigError::MissingVar { key }),
    }
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_optional_number<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    get_optional_var(key)
        .map(|value| {
            value
                .parse()
                .map_err(|source| ConfigError::InvalidNumber { key, source })
        })
        .transpose()
}

fn get_optional_amount(key: &'static str) -> Result<Option<Amount>, ConfigError> {
    get_optional_var(key)
        .map(|value| {
            Amount::parse(&value).map_err(|source| ConfigError::InvalidAmount { key, source })
        })
        .transpose()
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("PI_SWEEPER_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid amount in `{key}`: {source}")]
    InvalidAmount {
        key: &'static str,
        #[source]
        source: AmountError,
    },
    #[error("`{key}` out of range: {reason}")]
    OutOfRange {
        key: &'static str,
        reason: &'static str,
    },
    #[error("invalid account address in `{key}`: {source}")]
    InvalidAddress {
        key: &'static str,
        #[source]
        source: AddressError,
    },
    #[error("invalid `DERIVATION_PATH`: {source}")]
    InvalidDerivationPath {
        #[source]
        source: KeyError,
    },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
