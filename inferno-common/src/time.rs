//! Timestamp utilities and resource identifiers

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Last identifier handed out by [`ResourceId::generate`]
static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Wall-clock based identifier used as the file name stem of buffered resources
///
/// The value is microseconds since the Unix epoch. Identifiers minted by one process
/// are strictly increasing even if the wall clock stalls or steps backwards, so they
/// double as a write-order key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(i64);

impl ResourceId {
    /// Mint a new identifier from the current wall-clock time
    pub fn generate() -> Self {
        let wall = now().timestamp_micros();
        let bump = |last: i64| if wall > last { wall } else { last + 1 };

        // fetch_update hands back the value it replaced; recompute what it stored
        let previous = match LAST_ID.fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(bump(last))
        }) {
            Ok(prev) | Err(prev) => prev,
        };
        Self(bump(previous))
    }

    /// Microseconds since the Unix epoch
    pub fn as_micros(&self) -> i64 {
        self.0
    }

    /// File name stem for this id, e.g. `image_1730000000123456`
    pub fn stem(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
