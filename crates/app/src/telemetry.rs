//! Log subscriber and metrics exporter set-up.

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::Result;
use crate::config::{Config, LogFormat};

/// Installs the global tracing subscriber and, when `METRICS_ADDR` is set,
/// a Prometheus recorder with its own HTTP listener.
///
/// Must be called once, from inside the Tokio runtime.
pub fn init(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
    }

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        tracing::info!(%addr, "serving Prometheus metrics");
    }

    for setting in &config.invalid {
        tracing::warn!(setting = %setting, "ignoring invalid setting, using its default");
    }

    Ok(())
}
