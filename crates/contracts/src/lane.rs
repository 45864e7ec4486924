//! Lane - skater identifier on the timing wire
//!
//! A lane is the only per-skater identifier the timing listener ever sees,
//! so it is kept as a small `Copy` newtype rather than a bare integer.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Lowest lane number a timing listener accepts.
pub const MIN_LANE: u8 = 1;

/// Highest lane number a timing listener accepts.
pub const MAX_LANE: u8 = 10;

/// Skater lane number.
///
/// Range checks (`MIN_LANE..=MAX_LANE`) belong to the configuration
/// validator; constructing a `Lane` never fails.
///
/// # Examples
/// ```
/// use contracts::Lane;
///
/// let lane = Lane::new(3);
/// assert_eq!(lane.get(), 3);
/// assert_eq!(lane.to_string(), "3");
/// assert!(lane.is_in_range());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Lane(u8);

impl Lane {
    /// Create a lane from its number.
    #[inline]
    pub const fn new(number: u8) -> Self {
        Self(number)
    }

    /// Raw lane number.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Whether the lane number is one the listener accepts.
    #[inline]
    pub fn is_in_range(self) -> bool {
        (MIN_LANE..=MAX_LANE).contains(&self.0)
    }

    /// Whether the lane number is even (used for the per-lane pace bias).
    #[inline]
    pub fn is_even(self) -> bool {
        self.0 % 2 == 0
    }
}

impl From<u8> for Lane {
    #[inline]
    fn from(number: u8) -> Self {
        Self(number)
    }
}

impl From<Lane> for u8 {
    #[inline]
    fn from(lane: Lane) -> Self {
        lane.0
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lane({})", self.0)
    }
}

impl PartialEq<u8> for Lane {
    #[inline]
    fn eq(&self, other: &u8) -> bool {
        self.0 == *other
    }
}

// Serialized as the bare number
impl Serialize for Lane {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for Lane {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let number = u8::deserialize(deserializer)?;
        Ok(Self(number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_range() {
        assert!(!Lane::new(0).is_in_range());
        assert!(Lane::new(1).is_in_range());
        assert!(Lane::new(10).is_in_range());
        assert!(!Lane::new(11).is_in_range());
    }

    #[test]
    fn test_parity() {
        assert!(Lane::new(2).is_even());
        assert!(!Lane::new(7).is_even());
    }

    #[test]
    fn test_equality() {
        let lane: Lane = 4.into();
        assert_eq!(lane, 4);
        assert_eq!(lane, Lane::new(4));
        assert_eq!(u8::from(lane), 4);
    }

    #[test]
    fn test_hashmap_key() {
        let mut map: HashMap<Lane, &str> = HashMap::new();
        map.insert(Lane::new(1), "inside");
        map.insert(Lane::new(2), "outside");

        assert_eq!(map.get(&Lane::new(1)), Some(&"inside"));
        assert_eq!(map.get(&Lane::new(3)), None);
    }

    #[test]
    fn test_serde() {
        let lane = Lane::new(7);
        let json = serde_json::to_string(&lane).unwrap();
        assert_eq!(json, "7");

        let parsed: Lane = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, lane);
    }
}
