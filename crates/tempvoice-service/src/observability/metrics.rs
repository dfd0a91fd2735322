//! Metric recording helpers.
//!
//! All metrics use the `tv_` prefix; counters end in `_total` and duration
//! histograms in `_seconds`. Label values come from closed enums or
//! `&'static str` operation names so cardinality stays bounded.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Outcome label for a finished dialog instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogOutcomeLabel {
    Collected,
    Expired,
    Retired,
}

impl DialogOutcomeLabel {
    fn as_str(self) -> &'static str {
        match self {
            DialogOutcomeLabel::Collected => "collected",
            DialogOutcomeLabel::Expired => "expired",
            DialogOutcomeLabel::Retired => "retired",
        }
    }
}

/// A room was created by the provider.
pub fn record_room_created() {
    counter!("tv_rooms_created_total").increment(1);
}

/// A room was deleted (or found already gone) during teardown.
pub fn record_room_deleted() {
    counter!("tv_rooms_deleted_total").increment(1);
}

/// Number of rooms with a live panel task.
pub fn set_rooms_active(count: usize) {
    // usize to f64 is exact for any realistic room count (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("tv_rooms_active").set(count as f64);
}

/// Time from trigger arrival to a finished (or abandoned) provisioning.
pub fn record_provisioning(status: &'static str, duration: Duration) {
    histogram!("tv_provisioning_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
}

/// A dialog instance reached a terminal state.
pub fn record_dialog_outcome(outcome: DialogOutcomeLabel) {
    counter!("tv_dialog_outcomes_total", "outcome" => outcome.as_str()).increment(1);
}

/// One store query.
pub fn record_db_query(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!(
        "tv_db_query_duration_seconds",
        "operation" => operation,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("tv_db_queries_total", "operation" => operation, "status" => status).increment(1);
}

/// A notification handler failed and its operation was dropped.
pub fn record_notification_dropped(kind: &'static str) {
    counter!("tv_notifications_dropped_total", "kind" => kind).increment(1);
}
