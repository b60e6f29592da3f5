use std::collections::HashSet;

use tracing::{debug, warn};

use crate::{
    access::Library,
    embedding::{Embedder, embed_and_store},
    error::Result,
};

/// Documents grouped by the state of their stored vector.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct VectorDiff {
    /// Documents with no stored vector.
    pub missing: Vec<u64>,
    /// Documents whose vector has a different dimension than expected.
    pub stale_dimension: Vec<u64>,
    /// Documents whose vector is usable as is.
    pub current: Vec<u64>,
    /// Vectors with no document behind them.
    pub orphaned: Vec<u64>,
}

impl VectorDiff {
    /// Ids that need a new vector.
    pub fn needs_embedding(&self) -> Vec<u64> {
        self.missing
            .iter()
            .chain(&self.stale_dimension)
            .copied()
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
            && self.stale_dimension.is_empty()
            && self.orphaned.is_empty()
    }
}

/// Compare every stored document against its vector.
pub fn diff_vectors(library: &Library, dimension: usize) -> Result<VectorDiff> {
    let doc_ids = library.documents.list_ids()?;
    let known: HashSet<u64> = doc_ids.iter().copied().collect();

    let mut diff = VectorDiff::default();
    for (doc_id, vector) in library.vectors.batch_load(&doc_ids)? {
        match vector {
            None => diff.missing.push(doc_id),
            Some(v) if v.len() != dimension => diff.stale_dimension.push(doc_id),
            Some(_) => diff.current.push(doc_id),
        }
    }

    diff.orphaned = library
        .vectors
        .list_ids()?
        .into_iter()
        .filter(|id| !known.contains(id))
        .collect();

    if !diff.stale_dimension.is_empty() {
        warn!(
            count = diff.stale_dimension.len(),
            expected = dimension,
            "found vectors with a stale dimension"
        );
    }
    debug!(
        missing = diff.missing.len(),
        stale = diff.stale_dimension.len(),
        current = diff.current.len(),
        orphaned = diff.orphaned.len(),
        "diffed stored vectors"
    );

    Ok(diff)
}

/// Recompute vectors for `doc_ids` in batches of `batch_size`.
///
/// `on_batch` is called with the number of documents finished after each
/// batch. Ids whose document has since disappeared are skipped.
///
/// Returns the number of vectors written.
pub fn reembed_stale(
    library: &Library,
    embedder: &dyn Embedder,
    doc_ids: &[u64],
    batch_size: usize,
    mut on_batch: impl FnMut(usize),
) -> Result<usize> {
    let mut written = 0;
    for chunk in doc_ids.chunks(batch_size.max(1)) {
        let mut texts = Vec::with_capacity(chunk.len());
        for &doc_id in chunk {
            if let Some(doc) = library.documents.get(doc_id)? {
                texts.push((doc_id, doc.content));
            }
        }
        written += embed_and_store(embedder, &library.vectors, &texts)?;
        on_batch(chunk.len());
    }
    Ok(written)
}

/// Delete vectors that no longer belong to a document.
pub fn remove_orphans(library: &Library, orphaned: &[u64]) -> Result<()> {
    if orphaned.is_empty() {
        return Ok(());
    }
    library.vectors.batch_remove(orphaned)?;
    debug!(count = orphaned.len(), "removed orphaned vectors");
    Ok(())
}
