//! Provide tracing, tailored to this program.
//!
//! The binary calls [`init_journald_or_stderr`] once at startup to install a
//! subscriber. Diagnostics go to stderr (or journald) so they never mix with
//! the monitored data, which the binary prints on stdout.
//!
//! The rest of the crate does `use crate::tracing::prelude::*` for the
//! `trace!()`, `debug!()`, `info!()`, `warn!()` and `error!()` macros.

use std::env;
use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Initialize logging.
///
/// If running under systemd, use journald; otherwise fall back to stderr.
pub fn init_journald_or_stderr() {
    if env::var("JOURNAL_STREAM").is_ok() {
        if let Ok(layer) = tracing_journald::layer() {
            tracing_subscriber::registry().with(layer).init();
        } else {
            use_stderr();
            error!("Failed to initialize journald logging, using stderr.");
        }
    } else {
        use_stderr();
    }
}

// Log to stderr, filtering according to RUST_LOG, with INFO as the default
// level instead of ERROR.
fn use_stderr() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(LocalTimer),
        )
        .init();
}

/// Current wall-clock time, local if the offset is known, else UTC.
pub(crate) fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Format a time as `HH:MM:SS`.
pub(crate) fn clock(at: OffsetDateTime) -> String {
    at.format(time::macros::format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| format!("{:02}:{:02}:{:02}", at.hour(), at.minute(), at.second()))
}

// Timestamps in local time to the nearest second. The default timer is UTC
// with a long, ugly format.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", clock(now()))
    }
}
