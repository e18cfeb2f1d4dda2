use dashmap::DashMap;

/// Memoizes transport-assigned media identifiers by canonical media reference
///
/// Transports typically return a reusable identifier after the first upload of
/// an image. Caching it saves re-uploads on every catalog render. The cache is
/// an injected collaborator rather than process-global state so tests can run
/// with an empty one.
#[derive(Debug, Default)]
pub struct MediaCache {
    entries: DashMap<String, String>,
}

impl MediaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memoized transport identifier for a media reference
    pub fn get(&self, reference: &str) -> Option<String> {
        self.entries.get(reference).map(|id| id.clone())
    }

    /// Memoizes a transport identifier for a media reference
    pub fn insert(&self, reference: impl Into<String>, media_id: impl Into<String>) {
        self.entries.insert(reference.into(), media_id.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
