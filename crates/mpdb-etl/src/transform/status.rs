//! Source status vocabulary to canonical lifecycle status.

use chrono::NaiveDate;
use mpdb_core::{DateRange, LifecycleStatus, MediaBuyStatus};
use rust_decimal::Decimal;

const STATUS_TABLE: &[(&str, LifecycleStatus)] = &[
    ("draft", LifecycleStatus::Draft),
    ("new", LifecycleStatus::Draft),
    ("proposal", LifecycleStatus::Draft),
    ("proposed", LifecycleStatus::Draft),
    ("planning", LifecycleStatus::Draft),
    ("pending", LifecycleStatus::Pending),
    ("pending_approval", LifecycleStatus::Pending),
    ("submitted", LifecycleStatus::Pending),
    ("in_review", LifecycleStatus::Pending),
    ("awaiting_approval", LifecycleStatus::Pending),
    ("approved", LifecycleStatus::Approved),
    ("booked", LifecycleStatus::Approved),
    ("signed", LifecycleStatus::Approved),
    ("confirmed", LifecycleStatus::Approved),
    ("active", LifecycleStatus::Active),
    ("live", LifecycleStatus::Active),
    ("running", LifecycleStatus::Active),
    ("in_flight", LifecycleStatus::Active),
    ("launched", LifecycleStatus::Active),
    ("paused", LifecycleStatus::Paused),
    ("on_hold", LifecycleStatus::Paused),
    ("hold", LifecycleStatus::Paused),
    ("suspended", LifecycleStatus::Paused),
    ("completed", LifecycleStatus::Completed),
    ("complete", LifecycleStatus::Completed),
    ("ended", LifecycleStatus::Completed),
    ("finished", LifecycleStatus::Completed),
    ("delivered", LifecycleStatus::Completed),
    ("closed", LifecycleStatus::Completed),
    ("cancelled", LifecycleStatus::Cancelled),
    ("canceled", LifecycleStatus::Cancelled),
    ("void", LifecycleStatus::Cancelled),
    ("rejected", LifecycleStatus::Cancelled),
    ("archived", LifecycleStatus::Cancelled),
];

fn normalize(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Map a source status string; `None` when it is not in the table.
#[must_use]
pub fn lookup_status(raw: &str) -> Option<LifecycleStatus> {
    let key = normalize(raw);
    STATUS_TABLE
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, status)| *status)
}

/// Derive a media buy's status from its flight and spend ratio.
///
/// Spend decides first: past budget is `Overspent`, exactly at budget is
/// `Completed`. Otherwise the flight dates place it relative to `as_of`.
#[must_use]
pub fn media_buy_status(flight: &DateRange, spend_ratio: Decimal, as_of: NaiveDate) -> MediaBuyStatus {
    if spend_ratio > Decimal::ONE {
        return MediaBuyStatus::Overspent;
    }
    if spend_ratio == Decimal::ONE || flight.end.is_some_and(|end| as_of > end) {
        return MediaBuyStatus::Completed;
    }
    if flight.start.is_some_and(|start| as_of < start) {
        return MediaBuyStatus::Scheduled;
    }
    MediaBuyStatus::Live
}
