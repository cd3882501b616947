use once_cell::sync::OnceCell;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Output format for the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install the global tracing subscriber.
///
/// Safe to call more than once: only the first call wins, later calls are
/// no-ops. The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_logger(service_name: &'static str, format: LogFormat) {
    LOGGER_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_span_events(fmt::format::FmtSpan::CLOSE);

        // try_init: a test harness may already own the global default.
        let installed = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(base.json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(filter)
                .with(base.pretty())
                .try_init(),
        };

        if installed.is_ok() {
            tracing::info!(service = service_name, ?format, "logger initialized");
        }
    });
}
