use super::descriptor::PageKey;
use crate::core::util::HashSet;

/// The (owner, page) pairs shown at least once since process start. A page
/// only resolves initial values while its key is absent from this set.
#[derive(Clone, Debug, Default)]
pub struct VisitMarker {
    visited: HashSet<PageKey>,
}

impl VisitMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &PageKey) -> bool {
        self.visited.contains(key)
    }

    /// Returns true when this is the first time the key is marked.
    pub fn mark(&mut self, key: &PageKey) -> bool {
        self.visited.insert(key.clone())
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}
