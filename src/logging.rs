//! Subscriber setup for applications embedding courier.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the host. These helpers cover the common case of a console
//! subscriber filtered through `COURIER_LOG`.

use crate::config::{Config, LOG_ENV};
use std::sync::OnceLock;
use tracing_subscriber::{fmt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install a console subscriber using `COURIER_LOG`, or the config's
/// `log_filter` when the variable is unset. Safe to call more than once.
pub fn init(config: &Config) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone()));

        let subscriber = fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .with_thread_ids(true)
            .finish();

        // Another subscriber (the host's, or a test harness) may already be set.
        if subscriber.try_init().is_err() {
            tracing::debug!("global tracing subscriber already installed");
        }
    });
}

/// Install a subscriber that writes through the test writer so output is
/// captured per test.
pub fn init_for_tests() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}
