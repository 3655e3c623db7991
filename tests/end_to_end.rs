//! End-to-end scenarios: index documents, ask questions, assemble context.

use std::collections::HashMap;
use std::sync::Arc;

use docindex::cache::MemoryCache;
use docindex::embedding::HashingEmbedding;
use docindex::prelude::*;
use docindex::{DocIndexError, RetrievedContext};
use tempfile::tempdir;

/// In-memory document store with per-user visibility.
struct DocumentStore {
    documents: HashMap<DocumentId, (i64, String)>,
}

impl DocumentStore {
    fn new(documents: &[(i64, i64, &str)]) -> Self {
        Self {
            documents: documents
                .iter()
                .map(|&(id, owner, text)| (DocumentId(id), (owner, text.to_string())))
                .collect(),
        }
    }
}

impl DocumentResolver for DocumentStore {
    fn resolve_document_content(
        &self,
        ids: &[DocumentId],
        tenant: &TenantContext,
    ) -> Result<Vec<String>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.documents.get(id))
            .filter(|(owner, _)| *owner == tenant.user_id)
            .map(|(_, text)| text.clone())
            .collect())
    }
}

/// A resolver whose database is down.
struct OfflineStore;

impl DocumentResolver for OfflineStore {
    fn resolve_document_content(
        &self,
        _ids: &[DocumentId],
        _tenant: &TenantContext,
    ) -> Result<Vec<String>> {
        Err(DocIndexError::resolver("database unavailable"))
    }
}

fn open_manager(dir: &tempfile::TempDir) -> IndexManager {
    IndexManager::open(
        Config::with_index_path(dir.path().join("documents.hnsw")),
        Arc::new(HashingEmbedding::new(384)),
        Arc::new(MemoryCache::new()),
    )
    .unwrap()
}

#[test]
fn test_revenue_question_finds_revenue_report() {
    let dir = tempdir().unwrap();
    let manager = open_manager(&dir);

    manager
        .insert_document(DocumentId(101), "quarterly revenue report")
        .unwrap();
    manager
        .insert_document(DocumentId(102), "employee leave policy")
        .unwrap();

    let result = manager.search("revenue figures this quarter", 1).unwrap();
    assert_eq!(result.ids, vec![DocumentId(101)]);

    let both = manager.search("revenue figures this quarter", 2).unwrap();
    assert_eq!(both.ids, vec![DocumentId(101), DocumentId(102)]);
    assert!(both.distances[0] < both.distances[1]);
}

#[test]
fn test_sync_job_indexes_only_new_documents() {
    let dir = tempdir().unwrap();
    let manager = open_manager(&dir);

    let batch_one = [(1, "security awareness training"), (2, "expense report template")];
    for (id, text) in batch_one {
        assert!(manager.insert_if_absent(DocumentId(id), text).unwrap());
    }

    // Second run sees one old and one new document
    let batch_two = [(2, "expense report template"), (3, "holiday schedule")];
    let added: Vec<bool> = batch_two
        .iter()
        .map(|&(id, text)| manager.insert_if_absent(DocumentId(id), text).unwrap())
        .collect();

    assert_eq!(added, vec![false, true]);
    assert_eq!(manager.len().unwrap(), 3);
}

#[test]
fn test_bulk_load_then_retrieve_context() {
    let dir = tempdir().unwrap();
    let manager = open_manager(&dir);

    let docs = [
        (101, 1, "Quarterly revenue report: revenue grew 12% this quarter."),
        (102, 1, "Employee leave policy: 25 days of annual leave."),
        (103, 2, "Revenue forecast for next quarter, restricted to finance."),
    ];
    let batch: Vec<(DocumentId, &str)> = docs
        .iter()
        .map(|&(id, _, text)| (DocumentId(id), text))
        .collect();
    assert_eq!(manager.insert_documents(&batch).unwrap(), 3);

    let store = DocumentStore::new(&docs);
    let tenant = TenantContext::new(1);

    let context = manager
        .retrieve_context("revenue this quarter", 3, &store, &tenant)
        .unwrap();
    assert_eq!(context.ids.len(), 3);
    assert!(context.content.contains("revenue grew 12%"));
    // User 1 can't read document 103
    assert!(!context.content.contains("restricted to finance"));
    assert_eq!(context.content.matches("\n\n").count(), 1);
}

#[test]
fn test_retrieve_context_with_nothing_readable_is_empty() {
    let dir = tempdir().unwrap();
    let manager = open_manager(&dir);
    let store = DocumentStore::new(&[(1, 99, "someone else's notes")]);

    // Empty index
    let context = manager
        .retrieve_context("notes", 5, &store, &TenantContext::new(1))
        .unwrap();
    assert_eq!(context, RetrievedContext::empty());

    // Matches exist but belong to another user
    manager
        .insert_document(DocumentId(1), "someone else's notes")
        .unwrap();
    let context = manager
        .retrieve_context("notes", 5, &store, &TenantContext::new(1))
        .unwrap();
    assert!(context.is_empty());
}

#[test]
fn test_resolver_failure_propagates() {
    let dir = tempdir().unwrap();
    let manager = open_manager(&dir);
    manager.insert_document(DocumentId(1), "anything").unwrap();

    let err = manager
        .retrieve_context("anything", 1, &OfflineStore, &TenantContext::new(1))
        .unwrap_err();
    assert!(matches!(err, DocIndexError::Resolver(_)));
}
