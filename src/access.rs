//! Authorization of document reads and assembly of the candidate set a
//! principal may search.
//!
//! A principal can read a document when they own it, when it is public, or
//! when they are listed as a collaborator. Ranking never sees documents
//! outside that set.

use serde::Serialize;
use tracing::debug;

use crate::{
    document_db::{DocumentDb, StoredDocument, Visibility},
    error::Result,
    ranking::Candidate,
    vector_db::VectorDb,
};

/// The user on whose behalf a search runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Whether `principal` may read `doc`.
pub fn can_read(principal: &Principal, doc: &StoredDocument) -> bool {
    doc.owner == principal.user_id
        || doc.visibility == Visibility::Public
        || doc.collaborators.iter().any(|c| *c == principal.user_id)
}

/// User-facing view of a document returned with search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub doc_num_id: u64,
    pub title: String,
    pub owner: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub updated_at: u64,
}

impl DocumentSummary {
    pub fn from_stored(doc_num_id: u64, doc: &StoredDocument) -> Self {
        Self {
            id: doc.id.clone(),
            doc_num_id,
            title: doc.title.clone(),
            owner: doc.owner.clone(),
            tags: doc.tags.clone(),
            visibility: doc.visibility,
            updated_at: doc.updated_at,
        }
    }
}

/// Supplies the documents a principal is authorized to search, each with
/// its stored vector.
pub trait CandidateSource {
    fn authorized_candidates(
        &self,
        principal: &Principal,
    ) -> Result<Vec<Candidate<DocumentSummary>>>;
}

/// The persistent document and vector stores opened together.
#[derive(Debug)]
pub struct Library {
    pub documents: DocumentDb,
    pub vectors: VectorDb,
}

impl Library {
    pub fn new(documents: DocumentDb, vectors: VectorDb) -> Self {
        Self { documents, vectors }
    }
}

impl CandidateSource for Library {
    fn authorized_candidates(
        &self,
        principal: &Principal,
    ) -> Result<Vec<Candidate<DocumentSummary>>> {
        let readable: Vec<(u64, StoredDocument)> = self
            .documents
            .list()?
            .into_iter()
            .filter(|(_, doc)| can_read(principal, doc))
            .collect();

        let ids: Vec<u64> = readable.iter().map(|(id, _)| *id).collect();
        let vectors = self.vectors.batch_load(&ids)?;

        let mut candidates = Vec::with_capacity(readable.len());
        for ((doc_num_id, doc), (_, vector)) in readable.iter().zip(vectors) {
            let Some(vector) = vector else {
                debug!(doc = %doc.id, "skipping document without a vector");
                continue;
            };
            candidates.push(Candidate {
                id: doc.id.clone(),
                vector,
                payload: DocumentSummary::from_stored(*doc_num_id, doc),
            });
        }

        debug!(
            user = %principal.user_id,
            count = candidates.len(),
            "collected authorized candidates"
        );
        Ok(candidates)
    }
}

/// A fixed candidate set, for callers that materialize candidates
/// themselves. Every entry is treated as readable.
impl CandidateSource for Vec<Candidate<DocumentSummary>> {
    fn authorized_candidates(
        &self,
        _principal: &Principal,
    ) -> Result<Vec<Candidate<DocumentSummary>>> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(owner: &str, collaborators: &[&str], vis: Visibility) -> StoredDocument {
        StoredDocument {
            id: format!("{owner}-doc"),
            title: "Title".to_string(),
            content: "content".to_string(),
            tags: Vec::new(),
            owner: owner.to_string(),
            collaborators: collaborators.iter().map(|c| c.to_string()).collect(),
            visibility: vis,
            content_hash: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn owner_can_read_private() {
        let d = doc("alice", &[], Visibility::Private);
        assert!(can_read(&Principal::new("alice"), &d));
        assert!(!can_read(&Principal::new("mallory"), &d));
    }

    #[test]
    fn collaborator_can_read_private() {
        let d = doc("alice", &["bob"], Visibility::Private);
        assert!(can_read(&Principal::new("bob"), &d));
    }

    #[test]
    fn anyone_can_read_public() {
        let d = doc("alice", &[], Visibility::Public);
        assert!(can_read(&Principal::new("carol"), &d));
    }

    fn library() -> (tempfile::TempDir, Library) {
        let tmp = tempfile::tempdir().unwrap();
        let documents =
            DocumentDb::open(&tmp.path().join("documents.redb")).unwrap();
        let vectors = VectorDb::open(&tmp.path().join("vectors.redb")).unwrap();
        (tmp, Library::new(documents, vectors))
    }

    #[test]
    fn library_filters_by_access() {
        let (_tmp, lib) = library();

        let mut private = doc("alice", &[], Visibility::Private);
        private.id = "private".to_string();
        let mut shared = doc("alice", &["bob"], Visibility::Private);
        shared.id = "shared".to_string();
        let mut public = doc("carol", &[], Visibility::Public);
        public.id = "public".to_string();

        for (n, d) in [(1, &private), (2, &shared), (3, &public)] {
            lib.documents.put(n, d).unwrap();
            lib.vectors.store(n, &[1.0, 0.0]).unwrap();
        }

        let mut ids: Vec<String> = lib
            .authorized_candidates(&Principal::new("bob"))
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["public", "shared"]);

        let alice = lib.authorized_candidates(&Principal::new("alice")).unwrap();
        assert_eq!(alice.len(), 3);
    }

    #[test]
    fn library_skips_documents_without_vectors() {
        let (_tmp, lib) = library();
        lib.documents
            .put(1, &doc("alice", &[], Visibility::Public))
            .unwrap();

        let candidates =
            lib.authorized_candidates(&Principal::new("alice")).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn candidate_payload_is_summary() {
        let (_tmp, lib) = library();
        let mut d = doc("alice", &[], Visibility::Public);
        d.tags = vec!["howto".to_string()];
        lib.documents.put(5, &d).unwrap();
        lib.vectors.store(5, &[0.5, 0.5]).unwrap();

        let candidates =
            lib.authorized_candidates(&Principal::new("alice")).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].payload.doc_num_id, 5);
        assert_eq!(candidates[0].payload.tags, vec!["howto".to_string()]);
        assert_eq!(candidates[0].vector, vec![0.5, 0.5]);
    }
}
