//! Expiration policy attached to every cache write.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// How long a cache entry stays reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Entry lives until evicted for capacity or removed explicitly.
    #[default]
    NoExpiration,
    /// Entry expires after the given duration from the moment it is written.
    Ttl(Duration),
    /// Entry expires at a fixed point in time.
    Absolute(DateTime<Utc>),
}

impl CachePolicy {
    /// Creates a relative TTL policy.
    pub fn ttl(duration: Duration) -> Self {
        Self::Ttl(duration)
    }

    /// Creates an absolute expiration policy.
    pub fn absolute(at: DateTime<Utc>) -> Self {
        Self::Absolute(at)
    }

    /// Time left before the entry expires, measured from `now`.
    ///
    /// Returns `None` for entries that never expire and `Some(Duration::ZERO)`
    /// for absolute deadlines already in the past.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::NoExpiration => None,
            Self::Ttl(duration) => Some(*duration),
            Self::Absolute(at) => Some((*at - now).to_std().unwrap_or(Duration::ZERO)),
        }
    }
}
