use std::{env, net::SocketAddr, sync::Arc};

use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{hydrate_env_file, ConfigError};

static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();
static METRICS_HANDLE: OnceCell<Arc<PrometheusHandle>> = OnceCell::new();

/// Shared observability options for binaries.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    log_filter: String,
    metrics_address: Option<String>,
    /// Set when `.env` existed but could not be read; logged once tracing is up.
    env_file_error: Option<String>,
}

impl TelemetryConfig {
    /// Loads telemetry knobs from optional environment variables prefixed with
    /// `<PREFIX>_`, e.g. `SWEEPER_LOG_FILTER`. Missing entries fall back to
    /// defaults so the binary boots without extra configuration.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_env_after(prefix, hydrate_env_file())
    }

    fn from_env_after(prefix: &str, hydrated: Result<(), ConfigError>) -> Self {
        let env_file_error = hydrated.err().map(|err| err.to_string());
        let upper = prefix.trim().to_ascii_uppercase();
        let log_key = format!("{}_LOG_FILTER", upper);
        let metrics_key = format!("{}_METRICS_ADDRESS", upper);

        let log_filter = env::var(log_key).unwrap_or_else(|_| "info".to_string());
        let metrics_address = env::var(metrics_key).ok().and_then(|value| {
            if value.trim().is_empty() {
                None
            } else {
                Some(value)
            }
        });

        Self {
            log_filter,
            metrics_address,
            env_file_error,
        }
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn metrics_address(&self) -> Option<&str> {
        self.metrics_address.as_deref()
    }

    pub fn env_file_error(&self) -> Option<&str> {
        self.env_file_error.as_deref()
    }
}

/// Guard returned after telemetry initialization.
#[derive(Clone)]
pub struct TelemetryGuard {
    metrics: Arc<PrometheusHandle>,
}

impl TelemetryGuard {
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }
}

/// Wires up tracing + the metrics recorder once per process.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    install_tracing(config)?;
    if let Some(err) = config.env_file_error() {
        warn!(error = err, "ignoring unreadable .env file");
    }
    let metrics = install_metrics(config)?;

    gauge!("sweeper_build_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    info!(
        log_filter = config.log_filter(),
        metrics_address = config.metrics_address().unwrap_or("disabled"),
        "telemetry initialized"
    );

    Ok(TelemetryGuard { metrics })
}

fn install_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_new(config.log_filter())
        .map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;

    if SUBSCRIBER_INSTALLED.set(()).is_ok() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .map_err(|err| TelemetryError::Tracing(err.to_string()))?;
    }

    Ok(())
}

fn install_metrics(config: &TelemetryConfig) -> Result<Arc<PrometheusHandle>, TelemetryError> {
    METRICS_HANDLE
        .get_or_try_init(|| {
            let builder = PrometheusBuilder::new();
            let Some(addr) = config.metrics_address() else {
                return builder
                    .install_recorder()
                    .map(Arc::new)
                    .map_err(|err| TelemetryError::Metrics(err.to_string()));
            };

            let socket: SocketAddr = addr.parse().map_err(|err: std::net::AddrParseError| {
                TelemetryError::InvalidMetricsAddress(addr.to_string(), err.to_string())
            })?;
            let runtime = Handle::try_current().map_err(|_| {
                TelemetryError::Metrics("the metrics listener needs a tokio runtime".to_string())
            })?;

            let (recorder, exporter) = builder
                .with_http_listener(socket)
                .build()
                .map_err(|err| TelemetryError::Metrics(err.to_string()))?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|err| TelemetryError::Metrics(err.to_string()))?;

            runtime.spawn(async move {
                if let Err(err) = exporter.await {
                    warn!(error = ?err, "metrics listener stopped");
                }
            });
            info!(%socket, "serving prometheus metrics");

            Ok(Arc::new(handle))
        })
        .cloned()
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("invalid metrics address `{0}`: {1}")]
    InvalidMetricsAddress(String, String),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        net::{TcpListener, TcpStream},
        sync::Mutex,
        time::Duration,
    };

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    #[test]
    fn telemetry_config_uses_defaults() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("PI_SWEEPER_SKIP_DOTENV", "1");
        env::remove_var("SWEEPER_TEST_LOG_FILTER");
        env::remove_var("SWEEPER_TEST_METRICS_ADDRESS");

        let cfg = TelemetryConfig::from_env("sweeper_test");
        assert_eq!(cfg.log_filter(), "info");
        assert_eq!(cfg.metrics_address(), None);
        assert_eq!(cfg.env_file_error(), None);
    }

    #[test]
    fn telemetry_config_reads_env() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("PI_SWEEPER_SKIP_DOTENV", "1");
        env::set_var("SWEEPER_TEST_LOG_FILTER", "debug");
        env::set_var("SWEEPER_TEST_METRICS_ADDRESS", "127.0.0.1:9898");

        let cfg = TelemetryConfig::from_env("SWEEPER_TEST");
        assert_eq!(cfg.log_filter(), "debug");
        assert_eq!(cfg.metrics_address(), Some("127.0.0.1:9898"));

        env::remove_var("SWEEPER_TEST_LOG_FILTER");
        env::remove_var("SWEEPER_TEST_METRICS_ADDRESS");
    }

    #[test]
    fn empty_metrics_address_is_treated_as_none() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("PI_SWEEPER_SKIP_DOTENV", "1");
        env::set_var("SWEEPER_TEST_METRICS_ADDRESS", "  ");

        let cfg = TelemetryConfig::from_env("SWEEPER_TEST");
        assert_eq!(cfg.metrics_address(), None);

        env::remove_var("SWEEPER_TEST_METRICS_ADDRESS");
    }

    #[test]
    fn unreadable_env_file_is_kept_for_logging() {
        let _guard = ENV_GUARD.lock().unwrap();
        let cfg = TelemetryConfig::from_env_after(
            "SWEEPER_TEST",
            Err(ConfigError::Dotenv {
                source: dotenvy::Error::LineParse("NOT VALID".into(), 3),
            }),
        );
        let err = cfg.env_file_error().expect("error retained");
        assert!(err.contains("failed to load .env file"), "{err}");
    }

    #[tokio::test]
    async fn metrics_listener_serves_configured_address() {
        let port = {
            let _guard = ENV_GUARD.lock().unwrap();
            let placeholder = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = placeholder.local_addr().unwrap().port();
            drop(placeholder);

            env::set_var("PI_SWEEPER_SKIP_DOTENV", "1");
            env::set_var("SWEEPER_LISTEN_LOG_FILTER", "warn");
            env::set_var("SWEEPER_LISTEN_METRICS_ADDRESS", format!("127.0.0.1:{port}"));
            port
        };

        let cfg = TelemetryConfig::from_env("SWEEPER_LISTEN");
        let guard = init_telemetry(&cfg).expect("telemetry installs");
        env::remove_var("SWEEPER_LISTEN_LOG_FILTER");
        env::remove_var("SWEEPER_LISTEN_METRICS_ADDRESS");

        let mut reachable = false;
        for _ in 0..100 {
            if TcpStream::connect(("127.0.0.1", port)).is_ok() {
                reachable = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(reachable, "nothing listening on port {port}");
        assert!(guard.render_metrics().contains("sweeper_build_info"));
    }
}
