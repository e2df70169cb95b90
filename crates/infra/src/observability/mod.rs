//! Logging setup
//!
//! The library only emits `tracing` events; binaries and tests call
//! [`init_tracing`] once to print them.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Install a global fmt subscriber
///
/// `RUST_LOG` wins over `default_filter` (e.g. `"steadfast_infra=debug"`).
/// Returns `false` if a global subscriber was already installed, by this
/// function or by someone else.
pub fn init_tracing(default_filter: &str) -> bool {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return false;
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let logging_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    let subscriber = tracing_subscriber::Registry::default().with(logging_layer);
    tracing::subscriber::set_global_default(subscriber).is_ok()
}
