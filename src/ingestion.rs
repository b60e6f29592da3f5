use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::{
    access::{Library, Principal},
    doc_id::DocumentId,
    document_db::{StoredDocument, Visibility},
    embedding::{Embedder, content_hash},
    error::{Error, Result},
    text_index::{IndexedFields, TextIndex},
};

/// A document as submitted by a writer.
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub id: String,
    /// Derived from the first markdown heading when absent.
    pub title: Option<String>,
    pub content: String,
    pub tags: Vec<String>,
    /// `None` keeps the stored list on update.
    pub collaborators: Option<Vec<String>>,
    /// `None` keeps the stored visibility on update.
    pub visibility: Option<Visibility>,
}

/// What [`save_document`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub doc_id: DocumentId,
    pub created: bool,
    /// Whether the vector was recomputed.
    pub reembedded: bool,
}

/// Extract a title from document content.
///
/// Looks for the first markdown heading (line starting with `# `).
/// Falls back to `fallback`.
pub fn extract_title(content: &str, fallback: &str) -> String {
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("# ") {
            let title = heading.trim();
            if !title.is_empty() {
                return title.to_string();
            }
        }
    }
    fallback.to_string()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Create or update a document.
///
/// New documents are owned by `principal`. Updates require the principal
/// to be the owner or a collaborator; only the owner may change sharing
/// (visibility and collaborators). Sharing fields left as `None` keep their
/// stored values; a new document defaults to private with no collaborators.
///
/// The vector is recomputed whenever the content changed, the stored
/// vector is missing, or its dimension differs from `embedder`'s. The new
/// vector replaces the old one. The text index entry is always rewritten.
pub fn save_document(
    library: &Library,
    text_index: &TextIndex,
    embedder: &dyn Embedder,
    principal: &Principal,
    doc: NewDocument,
) -> Result<SaveReport> {
    if doc.id.trim().is_empty() {
        return Err(Error::InvalidInput(
            "document id must not be empty".to_string(),
        ));
    }

    let doc_id = DocumentId::new(&doc.id);
    let existing = library.documents.get(doc_id.numeric)?;
    let hash = content_hash(&doc.content);
    let title = doc
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| extract_title(&doc.content, &doc.id));

    let (stored, created, reembed) = match existing {
        None => {
            let stored = StoredDocument {
                id: doc.id,
                title,
                content: doc.content,
                tags: doc.tags,
                owner: principal.user_id.clone(),
                collaborators: doc.collaborators.unwrap_or_default(),
                visibility: doc.visibility.unwrap_or_default(),
                content_hash: hash,
                updated_at: now_secs(),
            };
            (stored, true, true)
        }
        Some(previous) => {
            let is_owner = previous.owner == principal.user_id;
            let is_collaborator =
                previous.collaborators.contains(&principal.user_id);
            if !is_owner && !is_collaborator {
                return Err(Error::Forbidden {
                    principal: principal.user_id.clone(),
                    document: previous.id,
                });
            }

            let current_vector = library.vectors.load(doc_id.numeric)?;
            let reembed = previous.content_hash != hash
                || current_vector
                    .is_none_or(|v| v.len() != embedder.dimension());

            let (collaborators, visibility) = if is_owner {
                (
                    doc.collaborators.unwrap_or(previous.collaborators),
                    doc.visibility.unwrap_or(previous.visibility),
                )
            } else {
                (previous.collaborators, previous.visibility)
            };

            let stored = StoredDocument {
                id: previous.id,
                title,
                content: doc.content,
                tags: doc.tags,
                owner: previous.owner,
                collaborators,
                visibility,
                content_hash: hash,
                updated_at: now_secs(),
            };
            (stored, false, reembed)
        }
    };

    if reembed {
        library
            .vectors
            .store(doc_id.numeric, &embedder.embed(&stored.content))?;
    }
    library.documents.put(doc_id.numeric, &stored)?;

    let mut writer = text_index.writer()?;
    text_index.add_document(
        &writer,
        IndexedFields {
            doc_id: &stored.id,
            doc_num_id: doc_id.numeric,
            owner: &stored.owner,
            title: &stored.title,
            body: &stored.content,
            tags: &stored.tags,
            updated_at: stored.updated_at,
        },
    )?;
    writer.commit()?;

    info!(
        doc = %stored.id,
        created,
        reembedded = reembed,
        "saved document"
    );

    Ok(SaveReport {
        doc_id,
        created,
        reembedded: reembed,
    })
}

/// Delete a document, its vector and its text index entry.
///
/// Only the owner may delete.
pub fn delete_document(
    library: &Library,
    text_index: &TextIndex,
    principal: &Principal,
    id: &str,
) -> Result<()> {
    let doc_id = DocumentId::new(id);
    let doc =
        library
            .documents
            .get(doc_id.numeric)?
            .ok_or_else(|| Error::NotFound {
                kind: "document",
                name: id.to_string(),
            })?;

    if doc.owner != principal.user_id {
        return Err(Error::Forbidden {
            principal: principal.user_id.clone(),
            document: doc.id,
        });
    }

    library.vectors.remove(doc_id.numeric)?;
    library.documents.remove(doc_id.numeric)?;

    let mut writer = text_index.writer()?;
    text_index.delete_document(&writer, &doc.id);
    writer.commit()?;

    debug!(doc = %doc.id, "deleted document");
    Ok(())
}
