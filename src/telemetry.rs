use crate::config::AppConfig;
use std::io;
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Install the operator-facing subscriber on stderr. Plain text unless `--json-logs`.
pub fn init_tracing(config: &AppConfig) {
    let _ = TRACING_INIT.get_or_init(|| {
        let builder = tracing_subscriber::fmt()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(io::stderr)
            .with_target(false);
        let result = if config.json_logs {
            tracing::subscriber::set_global_default(
                builder
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .finish(),
            )
        } else {
            tracing::subscriber::set_global_default(builder.finish())
        };
        if result.is_err() {
            crate::log_debug("tracing subscriber already installed");
        }
    });
}
