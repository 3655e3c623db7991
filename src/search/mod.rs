//! Search results and context retrieval for docindex.
//!
//! The index only knows ids and vectors. Turning ids back into readable
//! text is the job of the surrounding service, plugged in through
//! [`DocumentResolver`].
//!
//! ```text
//! query ──► IndexManager::search ──► SearchResult { ids, distances }
//!                                          │
//!                          DocumentResolver::resolve_document_content
//!                                          │
//!                                          ▼
//!                              RetrievedContext { ids, content }
//! ```

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::DocumentId;
use crate::vector::{codec, Neighbor};

/// Ids and distances of the nearest documents, closest first.
///
/// `ids[i]` pairs with `distances[i]`. May hold fewer than the requested
/// `k` entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Matched documents, nearest first.
    pub ids: Vec<DocumentId>,

    /// L2 distance of each match.
    pub distances: Vec<f32>,
}

/// One `(id, distance)` pair of a [`SearchResult`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchHit {
    /// Matched document.
    pub id: DocumentId,

    /// L2 distance from the query.
    pub distance: f32,
}

impl SearchResult {
    /// Creates an empty result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the number of matches.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if nothing matched.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns the closest match, if any.
    pub fn top(&self) -> Option<SearchHit> {
        self.hits().next()
    }

    /// Iterates over matches, nearest first.
    pub fn hits(&self) -> impl Iterator<Item = SearchHit> + '_ {
        self.ids
            .iter()
            .zip(&self.distances)
            .map(|(&id, &distance)| SearchHit { id, distance })
    }

    /// Encodes the result for the search cache.
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(codec().serialize(self)?)
    }

    /// Decodes a cached result. Returns `None` for damaged entries.
    pub(crate) fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let result: SearchResult = codec()
            .with_limit(bytes.len() as u64)
            .deserialize(bytes)
            .ok()?;
        (result.ids.len() == result.distances.len()).then_some(result)
    }
}

impl From<Vec<Neighbor>> for SearchResult {
    fn from(neighbors: Vec<Neighbor>) -> Self {
        let (ids, distances) = neighbors.into_iter().map(|n| (n.id, n.distance)).unzip();
        Self { ids, distances }
    }
}

/// Who is asking. Passed through to the resolver, which decides what
/// that caller may read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TenantContext {
    /// Requesting user.
    pub user_id: i64,

    /// Department whose documents the user may also read.
    pub department: Option<String>,
}

impl TenantContext {
    /// Creates a context for `user_id` with no department.
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            department: None,
        }
    }

    /// Sets the department.
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }
}

/// Maps search-result ids to readable text.
///
/// Implemented by the document-management layer. Ids the tenant may not
/// read, or that no longer exist, are simply left out.
pub trait DocumentResolver: Send + Sync {
    /// Returns the content of every readable document in `ids`.
    fn resolve_document_content(
        &self,
        ids: &[DocumentId],
        tenant: &TenantContext,
    ) -> Result<Vec<String>>;
}

/// Text assembled from the documents nearest to a query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RetrievedContext {
    /// Documents the content was assembled from, nearest first.
    pub ids: Vec<DocumentId>,

    /// Document contents joined by blank lines.
    pub content: String,
}

impl RetrievedContext {
    /// Context with no documents.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if no content was found.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Joins non-blank `contents` with blank lines.
    pub(crate) fn assemble(ids: Vec<DocumentId>, contents: Vec<String>) -> Self {
        let content = contents
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        if content.is_empty() {
            return Self::empty();
        }
        Self { ids, content }
    }
}
