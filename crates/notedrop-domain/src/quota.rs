//! Quota guard: storage ceilings and the free-tier group limit.
//!
//! Both checks are re-derived from subscription state on every call; there
//! are no cached counters. The controllers compute the ceiling here and
//! pass it into the store call; the store runs the check functions inside
//! the same critical section as the write.

use chrono::{DateTime, Duration, Utc};

use crate::error::{DomainError, DomainResult};
use crate::model::Subscription;

/// Cumulative per-note file size ceiling for premium actors.
pub const PREMIUM_STORAGE_LIMIT_BYTES: u64 = 50_000_000;
/// Cumulative per-note file size ceiling for free actors.
pub const FREE_STORAGE_LIMIT_BYTES: u64 = 15_000_000;
/// Number of group memberships a free actor may hold.
pub const FREE_MEMBERSHIP_LIMIT: usize = 3;
/// Length of a newly purchased subscription.
pub const SUBSCRIPTION_DAYS: i64 = 30;

/// Premium status is the logical OR of is-active over all subscriptions.
pub fn is_premium(subscriptions: &[Subscription], now: DateTime<Utc>) -> bool {
    subscriptions.iter().any(|s| s.is_active_at(now))
}

/// Storage ceiling for the actor's tier.
pub fn storage_limit(premium: bool) -> u64 {
    if premium {
        PREMIUM_STORAGE_LIMIT_BYTES
    } else {
        FREE_STORAGE_LIMIT_BYTES
    }
}

/// Membership ceiling for the actor's tier; `None` means unlimited.
pub fn membership_limit(premium: bool) -> Option<usize> {
    if premium {
        None
    } else {
        Some(FREE_MEMBERSHIP_LIMIT)
    }
}

/// Checks an incoming upload against the note's cumulative size. The
/// store calls this inside its critical section with the ceiling the
/// controller derived via [`storage_limit`].
pub fn check_storage_quota(
    existing_bytes: u64,
    incoming_bytes: u64,
    limit: u64,
) -> DomainResult<()> {
    if existing_bytes.saturating_add(incoming_bytes) > limit {
        return Err(DomainError::StorageQuotaExceeded { limit });
    }
    Ok(())
}

/// Checks a group create/join against the actor's membership count;
/// `None` means unlimited. Called by the store with the ceiling from
/// [`membership_limit`].
pub fn check_membership_quota(
    current_memberships: usize,
    limit: Option<usize>,
) -> DomainResult<()> {
    if let Some(limit) = limit {
        if current_memberships >= limit {
            return Err(DomainError::MembershipLimitReached { limit });
        }
    }
    Ok(())
}

/// The validity window of a subscription purchased now.
pub fn subscription_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (now, now + Duration::days(SUBSCRIPTION_DAYS))
}
