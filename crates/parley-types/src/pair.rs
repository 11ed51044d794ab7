use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Length of a hyphenated UUID string.
const UUID_LEN: usize = 36;

/// Canonical key for an unordered pair of users.
///
/// The two ids are stored sorted, so `PairKey::new(a, b) == PairKey::new(b, a)`.
/// The string form is `"<low>-<high>"` and doubles as the thread lookup key and
/// the realtime room name. Clients compute the same string by sorting the two
/// hyphenated ids and joining them with `-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    low: Uuid,
    high: Uuid,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PairKeyError {
    #[error("a pair needs two distinct users")]
    SameUser,
    #[error("malformed pair key: {0}")]
    Malformed(String),
}

impl PairKey {
    pub fn new(a: Uuid, b: Uuid) -> Result<Self, PairKeyError> {
        if a == b {
            return Err(PairKeyError::SameUser);
        }
        // Hyphenated lowercase strings sort the same way as the raw bytes,
        // so ordering by Uuid matches the client-side string sort.
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { low, high })
    }

    pub fn low(&self) -> Uuid {
        self.low
    }

    pub fn high(&self) -> Uuid {
        self.high
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.low == user_id || self.high == user_id
    }

    /// The member of the pair that is not `user_id`, if `user_id` is a member.
    pub fn other(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.low {
            Some(self.high)
        } else if user_id == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low.hyphenated(), self.high.hyphenated())
    }
}

impl FromStr for PairKey {
    type Err = PairKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || PairKeyError::Malformed(s.to_string());

        if s.len() != UUID_LEN * 2 + 1 {
            return Err(malformed());
        }
        let first = s.get(..UUID_LEN).ok_or_else(malformed)?;
        let sep = s.get(UUID_LEN..=UUID_LEN).ok_or_else(malformed)?;
        let second = s.get(UUID_LEN + 1..).ok_or_else(malformed)?;
        if sep != "-" {
            return Err(malformed());
        }

        let a: Uuid = first.parse().map_err(|_| malformed())?;
        let b: Uuid = second.parse().map_err(|_| malformed())?;
        Self::new(a, b)
    }
}

impl Serialize for PairKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PairKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(PairKey::new(a, b).unwrap(), PairKey::new(b, a).unwrap());
        assert_eq!(
            PairKey::new(a, b).unwrap().to_string(),
            PairKey::new(b, a).unwrap().to_string()
        );
    }

    #[test]
    fn matches_client_string_sort() {
        let a = Uuid::parse_str("f0000000-0000-4000-8000-000000000000").unwrap();
        let b = Uuid::parse_str("0a000000-0000-4000-8000-000000000000").unwrap();

        let mut ids = [a.to_string(), b.to_string()];
        ids.sort();
        let client_key = ids.join("-");

        assert_eq!(PairKey::new(a, b).unwrap().to_string(), client_key);
    }

    #[test]
    fn parses_its_own_display() {
        let key = PairKey::new(Uuid::new_v4(), Uuid::new_v4()).unwrap();
        let parsed: PairKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn rejects_self_pair_and_garbage() {
        let a = Uuid::new_v4();
        assert_eq!(PairKey::new(a, a), Err(PairKeyError::SameUser));
        assert!("not-a-key".parse::<PairKey>().is_err());
        assert!(format!("{a}_{a}").parse::<PairKey>().is_err());
        assert_eq!(
            format!("{a}-{a}").parse::<PairKey>(),
            Err(PairKeyError::SameUser)
        );
    }

    #[test]
    fn other_member() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let key = PairKey::new(a, b).unwrap();
        assert_eq!(key.other(a), Some(b));
        assert_eq!(key.other(b), Some(a));
        assert_eq!(key.other(Uuid::new_v4()), None);
        assert!(key.contains(a) && key.contains(b));
    }
}
