//! Structured cache keys
//!
//! Keys are ordered sequences of typed segments (`domain : scope : kind : id`
//! and similar shapes). All matching is structural — full segment-by-segment
//! equality — never substring containment on a joined string, so one id
//! being a textual prefix of another can never cause a false-positive
//! invalidation.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One segment of a structured cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    /// Named segment (domain, scope, collection name, filter name)
    Str(String),
    /// Entity identifier segment
    Id(Uuid),
    /// Numeric segment (page number, version)
    Num(i64),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Str(s) => write!(f, "{}", s),
            Segment::Id(id) => write!(f, "{}", id),
            Segment::Num(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for Segment {
    fn from(s: &str) -> Self {
        Segment::Str(s.to_string())
    }
}

impl From<String> for Segment {
    fn from(s: String) -> Self {
        Segment::Str(s)
    }
}

impl From<Uuid> for Segment {
    fn from(id: Uuid) -> Self {
        Segment::Id(id)
    }
}

impl From<i64> for Segment {
    fn from(n: i64) -> Self {
        Segment::Num(n)
    }
}

/// Hierarchical identifier for a cached object or collection
///
/// Compared by full structural equality. `Display` joins segments with `:`
/// for logging only and must never be used for matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    segments: Vec<Segment>,
}

impl CacheKey {
    /// Create a key from pre-built segments
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Create an empty key rooted at a domain name
    pub fn domain(domain: &str) -> Self {
        Self {
            segments: vec![domain.into()],
        }
    }

    /// Append a segment, returning the extended key
    pub fn push(mut self, segment: impl Into<Segment>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Segments in order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// First segment as a string, if it is one
    pub fn domain_name(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Whether any segment is the given entity id
    pub fn references_id(&self, id: Uuid) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Id(other) if *other == id))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        let id = Uuid::new_v4();
        let a = CacheKey::domain("inventory").push("items").push(id);
        let b = CacheKey::domain("inventory").push("items").push(id);
        let c = CacheKey::domain("inventory").push("items").push(Uuid::new_v4());

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_no_substring_false_positive() {
        // "item" is a textual prefix of "items" but the keys are distinct.
        let a = CacheKey::domain("inventory").push("item");
        let b = CacheKey::domain("inventory").push("items");
        assert_ne!(a, b);

        // A joined rendering of one containing the other is irrelevant.
        assert!(b.to_string().contains(&a.to_string()));
    }

    #[test]
    fn test_references_id() {
        let id = Uuid::new_v4();
        let key = CacheKey::domain("inventory").push("items").push(id);
        assert!(key.references_id(id));
        assert!(!key.references_id(Uuid::new_v4()));
    }

    #[test]
    fn test_display_joins_segments() {
        let key = CacheKey::domain("inventory").push("movements").push(7i64);
        assert_eq!(key.to_string(), "inventory:movements:7");
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn segment() -> impl Strategy<Value = Segment> {
        prop_oneof![
            "[a-z]{1,12}".prop_map(Segment::from),
            any::<i64>().prop_map(Segment::Num),
            any::<u128>().prop_map(|n| Segment::Id(Uuid::from_u128(n))),
        ]
    }

    proptest! {
        #[test]
        fn equal_segments_mean_equal_keys(
            segments in proptest::collection::vec(segment(), 1..5)
        ) {
            let a = CacheKey::new(segments.clone());
            let b = CacheKey::new(segments);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.to_string(), b.to_string());
        }

        #[test]
        fn extending_a_key_always_changes_it(
            segments in proptest::collection::vec(segment(), 1..4),
            extra in segment()
        ) {
            let base = CacheKey::new(segments);
            let extended = base.clone().push(extra);
            prop_assert_ne!(base, extended);
        }
    }
}
