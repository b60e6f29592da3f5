//! Deterministic text embeddings.
//!
//! The default generator hashes each whitespace token into a slot of a
//! fixed-length vector and L2-normalizes the result. It needs no model
//! download, so any text can be embedded offline and the same text always
//! produces the same vector. A learned model can be swapped in by
//! implementing [`Embedder`], as long as the dimension stays fixed for a
//! deployment.

use rayon::prelude::*;
use tracing::debug;

use crate::{
    doc_id::fnv1a,
    error::{Error, Result},
    vector_db::VectorDb,
};

/// Vector length produced by [`HashEmbedder::default`].
pub const DEFAULT_DIMENSION: usize = 384;

/// Number of leading tokens that contribute to an embedding. Longer texts
/// are truncated.
pub const MAX_EMBED_TOKENS: usize = 100;

/// Divisor applied to the absolute token hash before accumulation.
const HASH_SCALE: f32 = 1_000_000.0;

/// Produces fixed-length vectors from text.
pub trait Embedder: Send + Sync {
    /// Embed `text` into a vector of exactly [`Embedder::dimension`] floats.
    fn embed(&self, text: &str) -> Vec<f32>;

    /// Length of every vector returned by [`Embedder::embed`].
    fn dimension(&self) -> usize;

    /// Short identifier used in log output.
    fn name(&self) -> &str;
}

/// Hash-based pseudo-embedding.
///
/// Token `i` adds `|h| / 1e6` to slot `i mod dimension`, where `h` is
/// [`token_hash`] of the lower-cased token.
///
/// # Examples
///
/// ```
/// use kbsearch::embedding::{Embedder, HashEmbedder};
///
/// let embedder = HashEmbedder::default();
/// let v = embedder.embed("Rust ownership rules");
/// assert_eq!(v.len(), 384);
/// assert_eq!(v, embedder.embed("rust OWNERSHIP rules"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

impl HashEmbedder {
    /// Create a generator with a custom dimension. Zero is rejected.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidInput(
                "embedding dimension must be at least 1".to_string(),
            ));
        }
        Ok(Self { dimension })
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let mut vector = vec![0.0f32; self.dimension];

        for (i, token) in lowered
            .split_whitespace()
            .take(MAX_EMBED_TOKENS)
            .enumerate()
        {
            let magnitude = token_hash(token).unsigned_abs() as f32;
            vector[i % self.dimension] += magnitude / HASH_SCALE;
        }

        normalize(&mut vector);
        vector
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash-v1"
    }
}

/// Embed `text` with the default 384-dimension generator.
pub fn embed(text: &str) -> Vec<f32> {
    HashEmbedder::default().embed(text)
}

/// 32-bit polynomial string hash: `h = h * 31 + unit` over the UTF-16 code
/// units of `token`, wrapping on overflow.
///
/// ```
/// assert_eq!(kbsearch::embedding::token_hash("hello"), 99162322);
/// ```
pub fn token_hash(token: &str) -> i32 {
    token.encode_utf16().fold(0i32, |h, unit| {
        h.wrapping_mul(31).wrapping_add(i32::from(unit))
    })
}

/// Scale `vector` to unit length in place. A zero vector is left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// 64-bit FNV-1a fingerprint of a content snapshot.
///
/// Used to decide whether a stored vector is still current.
pub fn content_hash(text: &str) -> u64 {
    fnv1a(text.as_bytes())
}

/// Embed a batch of documents and store their vectors.
///
/// Takes `(numeric_id, text)` pairs, embeds them in parallel and writes all
/// vectors in a single transaction, replacing any previous value.
///
/// Returns the number of documents stored.
pub fn embed_and_store(
    embedder: &dyn Embedder,
    db: &VectorDb,
    documents: &[(u64, String)],
) -> Result<usize> {
    if documents.is_empty() {
        return Ok(0);
    }

    let entries: Vec<(u64, Vec<f32>)> = documents
        .par_iter()
        .map(|(doc_id, text)| (*doc_id, embedder.embed(text)))
        .collect();

    db.batch_store(&entries)?;
    debug!(
        count = entries.len(),
        embedder = embedder.name(),
        "stored document vectors"
    );

    Ok(entries.len())
}
