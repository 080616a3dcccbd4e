use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::blob::Blob;

/// A biometric proof-of-presence captured by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    pub data: Blob,
    /// When the client captured the reading. Bounds replay of old captures.
    pub captured_at: DateTime<Utc>,
}

impl Assertion {
    /// Is this assertion usable at `now`, given its validity window and the
    /// tolerated clock skew between client and server?
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration, skew: Duration) -> bool {
        self.captured_at <= now + skew && now - self.captured_at <= ttl
    }
}

/// Why a biometric check did not pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rejection {
    NotEnrolled,
    LowConfidenceMatch,
    ExpiredAssertion,
    MatcherTimeout,
}

impl Display for Rejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotEnrolled => "not enrolled",
            Self::LowConfidenceMatch => "low confidence match",
            Self::ExpiredAssertion => "expired assertion",
            Self::MatcherTimeout => "matcher timed out",
        })
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Assertion {
        pub fn example_fingerprint(now: DateTime<Utc>) -> Self {
            Self {
                data: Blob::example_fingerprint(),
                captured_at: now,
            }
        }

        pub fn example_face(now: DateTime<Utc>) -> Self {
            Self {
                data: Blob::example_face(),
                captured_at: now,
            }
        }
    }
}
