// Tracing setup. The filter sits behind a reload layer so the level from the
// config file can replace the bootstrap level once it is loaded.
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    // RUST_LOG wins over the given level when it parses.
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init();
}

/// Replaces the active filter with `level`.
///
/// Returns whether the new filter took effect. An explicit `RUST_LOG` keeps
/// precedence, and an unparsable level leaves the current filter in place.
pub fn apply_logging_level(level: &str) -> bool {
    if std::env::var_os("RUST_LOG").is_some() {
        return false;
    }
    let Some(handle) = LOG_RELOAD_HANDLE.get() else {
        return false;
    };

    let filter = match EnvFilter::try_new(level) {
        Ok(filter) => filter,
        Err(e) => {
            tracing::warn!(level = %level, error = %e, "invalid logging level, keeping current filter");
            return false;
        }
    };
    match handle.reload(filter) {
        Ok(()) => {
            tracing::debug!(level = %level, "logging level applied");
            true
        }
        Err(e) => {
            tracing::warn!(level = %level, error = %e, "failed to apply logging level");
            false
        }
    }
}
