use crate::config::LogFormat;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Installs the process-wide tracing subscriber: `RUST_LOG` drives the
/// filter, and the operator chooses text or JSON formatting.
pub fn init(level: &str, format: LogFormat) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

	match format {
		LogFormat::Text => {
			tracing_subscriber::registry()
				.with(filter)
				.with(tracing_subscriber::fmt::layer())
				.init();
		},
		LogFormat::Json => {
			tracing_subscriber::registry()
				.with(filter)
				.with(tracing_subscriber::fmt::layer().json())
				.init();
		},
	}
}
