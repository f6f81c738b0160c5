use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

const SERVICE_NAME: &str = "ringbound";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Human readable logs on stderr. Verbosity is controlled with `RUST_LOG` (defaults to info).
pub fn initialize_fmt_subscriber() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Bunyan-formatted JSON logs on stderr, one object per event, including span fields.
pub fn initialize_json_subscriber() {
    let formatting_layer = BunyanFormattingLayer::new(SERVICE_NAME.to_string(), std::io::stderr);

    Registry::default()
        .with(env_filter())
        .with(JsonStorageLayer)
        .with(formatting_layer)
        .init();
}
