//! Causal primitives: site identifiers, versions, watermarks.

/// Monotonic causal version assigned by the write path.
/// Never reused for the same (table, primary key, column) by the same site.
pub type Version = i64;

/// Stable identifier for a replica.
///
/// Ordering is byte-wise lexicographic over the raw identifier bytes, not
/// string collation. It is total and stable, which is what makes it usable
/// as a deterministic tie-break when two sites write the same version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SiteId(Vec<u8>);

impl SiteId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Empty site ids violate the write-path contract.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SiteId {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// The version boundary for one change-extraction scan.
///
/// Rows at or below `version` are old news; rows originated by
/// `exclude_site` are the requester's own writes. Scoped to a single scan,
/// never persisted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    pub version: Version,
    pub exclude_site: Option<SiteId>,
}

impl Watermark {
    pub fn new(version: Version, exclude_site: Option<SiteId>) -> Self {
        Self {
            version,
            exclude_site,
        }
    }

    /// Everything ever written: versions are always > 0.
    pub fn everything() -> Self {
        Self {
            version: 0,
            exclude_site: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_ordering_is_bytewise() {
        let a = SiteId::from("S1");
        let b = SiteId::from("S2");
        let c = SiteId::new(vec![0xffu8]);
        assert!(a < b);
        // Byte-wise, not collation: 0xff sorts above all ASCII.
        assert!(b < c);
        assert_eq!(a, SiteId::new(b"S1".to_vec()));
    }

    #[test]
    fn site_ordering_is_total_over_prefixes() {
        let short = SiteId::from("S");
        let long = SiteId::from("S1");
        assert!(short < long);
    }

    #[test]
    fn empty_site_is_flagged() {
        assert!(SiteId::new(Vec::new()).is_empty());
        assert!(!SiteId::from("S1").is_empty());
    }
}
