/// A stable document identifier derived from the document's external ID.
///
/// The numeric form keys the redb tables and must not change between
/// builds, so it uses FNV-1a rather than the std hasher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentId {
    /// The numeric ID used as the key in redb tables.
    pub numeric: u64,
    /// The short hex string for human display (e.g. "a1b2c3").
    pub short: String,
}

impl DocumentId {
    pub fn new(external_id: &str) -> Self {
        let numeric = fnv1a(external_id.as_bytes());
        let short = Self::short_hex(numeric, 6);
        Self { numeric, short }
    }

    fn short_hex(value: u64, len: usize) -> String {
        let full = format!("{value:016x}");
        full[..len].to_string()
    }

    /// Extend the short ID to avoid collisions.
    pub fn extend_short(&self, len: usize) -> Self {
        let len = len.clamp(6, 16);
        Self {
            numeric: self.numeric,
            short: Self::short_hex(self.numeric, len),
        }
    }
}

/// 64-bit FNV-1a.
pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in bytes {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.short)
    }
}
