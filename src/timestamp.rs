use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::SystemTime;

/// A Unix timestamp represented as a `u64`, used for admission windows and
/// charge bookkeeping.
///
/// Encodes seconds since the Unix epoch (1970-01-01T00:00:00Z). Admission
/// control compares these directly: window expiry, cooldown elapsed time,
/// and `blocked_until` dominance are all plain second arithmetic on this type.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTimestamp(u64);

impl UnixTimestamp {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("SystemTime before UNIX epoch?!?")
            .as_secs();
        Self(now)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Seconds elapsed from `earlier` to `self`, saturating at zero when
    /// `earlier` is in the future.
    pub fn secs_since(&self, earlier: UnixTimestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Seconds remaining until `later`, saturating at zero once `later`
    /// has passed. Used to compute `retryAfter` values.
    pub fn secs_until(&self, later: UnixTimestamp) -> u64 {
        later.0.saturating_sub(self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0.saturating_add(rhs))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_since_saturates() {
        let earlier = UnixTimestamp::from_secs(100);
        let later = UnixTimestamp::from_secs(130);
        assert_eq!(later.secs_since(earlier), 30);
        assert_eq!(earlier.secs_since(later), 0);
    }

    #[test]
    fn test_secs_until() {
        let now = UnixTimestamp::from_secs(1_000);
        let blocked_until = now + 129_600;
        assert_eq!(now.secs_until(blocked_until), 129_600);
        assert_eq!(blocked_until.secs_until(now), 0);
    }
}
