//! Observability for the Temp Voice engine.
//!
//! # Privacy by Default
//!
//! Instrumented entry points use `#[instrument(skip_all)]` and allow-list
//! their fields explicitly: community, owner and resource ids only. Room
//! names and free-text owner input are never logged.
//!
//! # Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `tv_rooms_created_total` | Counter | none |
//! | `tv_rooms_deleted_total` | Counter | none |
//! | `tv_rooms_active` | Gauge | none |
//! | `tv_provisioning_duration_seconds` | Histogram | `status` |
//! | `tv_dialog_outcomes_total` | Counter | `outcome` |
//! | `tv_db_query_duration_seconds` | Histogram | `operation`, `status` |
//! | `tv_db_queries_total` | Counter | `operation`, `status` |
//! | `tv_notifications_dropped_total` | Counter | `kind` |
//!
//! The embedding process installs the recorder; without one every call is a
//! no-op.

pub mod metrics;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "tv=info,tempvoice_service=info";

/// Install a global `tracing` subscriber.
///
/// Honors `RUST_LOG`, falling back to [`DEFAULT_LOG_FILTER`]. With `json`
/// set, events are emitted as one JSON object per line. Returns `false` if a
/// global subscriber was already installed.
pub fn init_tracing(json: bool) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .is_ok()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .is_ok()
    }
}
