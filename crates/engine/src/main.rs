//! Sweeper binary: watches the derived account and sweeps it once.

use std::{process::ExitCode, sync::Arc};

use pi_sweeper_domain::{
    config::{SweeperConfig, TelegramConfig},
    services::telemetry::{init_telemetry, TelemetryConfig},
    Notifier,
};
use pi_sweeper_engine::{
    launch_sweeper, notify::startup_failure_message, EngineError, HorizonLedger, LogNotifier,
    TelegramNotifier,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    match bootstrap().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("[sweeper] stopped: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn bootstrap() -> Result<(), EngineError> {
    let telemetry_config = TelemetryConfig::from_env("SWEEPER");
    let _telemetry = init_telemetry(&telemetry_config)?;

    let notifier = build_notifier()?;

    let config = match SweeperConfig::load_from_env() {
        Ok(config) => config,
        Err(err) => {
            notifier.notify(&startup_failure_message(&err)).await;
            return Err(err.into());
        }
    };

    let receipt = launch_sweeper(&config, notifier, |config| {
        HorizonLedger::new(config.horizon_url(), config.horizon_timeout())
    })
    .await
    .inspect_err(|err| {
        error!(error = %err, "sweeper stopped");
    })?;

    info!(
        hash = %receipt.transaction_hash,
        amount = %receipt.amount,
        destination = %receipt.destination,
        "sweep complete"
    );
    Ok(())
}

fn build_notifier() -> Result<Arc<dyn Notifier>, EngineError> {
    match TelegramConfig::load_from_env()? {
        Some(telegram) => Ok(Arc::new(TelegramNotifier::new(&telegram)?)),
        None => {
            warn!("TELEGRAM_TOKEN/TELEGRAM_CHAT_ID not set; notifications go to the log only");
            Ok(Arc::new(LogNotifier))
        }
    }
}
