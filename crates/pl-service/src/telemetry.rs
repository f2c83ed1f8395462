use std::sync::OnceLock;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogFormat;

static INSTALLED: OnceLock<LogFormat> = OnceLock::new();

/// Install the global subscriber and return the format in effect.
///
/// Only the first call has any effect; later calls return the format chosen
/// by that first call. The filter comes from `RUST_LOG` and defaults to
/// `info`. `log` records (Tantivy logs through `log`) are bridged into
/// tracing.
pub fn init_tracing(format: LogFormat) -> LogFormat {
    *INSTALLED.get_or_init(|| {
        let _ = tracing_log::LogTracer::init();
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let installed = match format {
            LogFormat::Plain => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true))
                .try_init(),
            LogFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_current_span(true))
                .try_init(),
        };
        if installed.is_err() {
            tracing::debug!("global subscriber already set");
        }
        format
    })
}

/// The format installed by [`init_tracing`], if it has run.
pub fn active_log_format() -> Option<LogFormat> {
    INSTALLED.get().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_format_wins() {
        let first = init_tracing(LogFormat::Plain);
        assert_eq!(init_tracing(LogFormat::Json), first);
        assert_eq!(active_log_format(), Some(first));
        tracing::info!("still logging");
    }
}
