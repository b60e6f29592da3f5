use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    access::{CandidateSource, Principal, can_read},
    doc_id::DocumentId,
    document_db::DocumentDb,
    embedding::Embedder,
    error::Result,
    ranking::{RankParams, rank},
    text_index::TextIndex,
};

/// Number of first-stage hits pulled from the text index.
const TEXT_CANDIDATE_LIMIT: usize = 1000;

/// A search result ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalResult {
    pub rank: usize,
    pub score: f32,
    pub doc_id: String,
    #[serde(skip)]
    pub doc_num_id: u64,
    pub short_id: String,
    pub title: String,
    pub owner: String,
    pub tags: Vec<String>,
    pub updated_at: u64,
}

/// Rank the documents `principal` may read by similarity to `query`.
///
/// Results carry 1-based ranks in descending score order.
pub fn execute_semantic_search(
    query: &str,
    params: RankParams,
    principal: &Principal,
    source: &dyn CandidateSource,
    embedder: &dyn Embedder,
) -> Result<Vec<FinalResult>> {
    let query_vector = embedder.embed(query);
    let candidates = source.authorized_candidates(principal)?;
    let candidate_count = candidates.len();
    let ranked = rank(&query_vector, candidates, params)?;

    debug!(
        user = %principal.user_id,
        candidates = candidate_count,
        results = ranked.len(),
        threshold = params.threshold,
        "semantic search"
    );

    Ok(ranked
        .into_iter()
        .enumerate()
        .map(|(i, r)| FinalResult {
            rank: i + 1,
            score: r.score,
            short_id: DocumentId::new(&r.id).short,
            doc_id: r.id,
            doc_num_id: r.payload.doc_num_id,
            title: r.payload.title,
            owner: r.payload.owner,
            tags: r.payload.tags,
            updated_at: r.payload.updated_at,
        })
        .collect())
}

/// Parameters for keyword search.
#[derive(Debug, Clone)]
pub struct TextSearchParams {
    pub query: String,
    pub count: usize,
    pub min_score: f32,
    pub no_fuzzy: bool,
    /// Ignore `count` and return every match.
    pub all: bool,
}

impl TextSearchParams {
    pub fn new(query: impl Into<String>, count: usize) -> Self {
        Self {
            query: query.into(),
            count,
            min_score: 0.0,
            no_fuzzy: false,
            all: false,
        }
    }
}

/// Execute the keyword search pipeline.
///
/// 1. BM25 retrieval via Tantivy, with fuzzy matching unless disabled
///    (top 1000)
/// 2. Drop documents `principal` may not read
/// 3. Filter by `min_score`
/// 4. Limit to `count` results
pub fn execute_text_search(
    params: &TextSearchParams,
    principal: &Principal,
    text_index: &TextIndex,
    documents: &DocumentDb,
) -> Result<Vec<FinalResult>> {
    let hits = if params.no_fuzzy {
        text_index.search(&params.query, TEXT_CANDIDATE_LIMIT)?
    } else {
        text_index.search_fuzzy(&params.query, TEXT_CANDIDATE_LIMIT)?
    };

    let limit = if params.all { usize::MAX } else { params.count };
    let mut results = Vec::new();
    for hit in hits {
        if results.len() >= limit {
            break;
        }
        if hit.score < params.min_score {
            continue;
        }
        let Some(doc) = documents.get(hit.doc_num_id)? else {
            warn!(doc = %hit.doc_id, "text index entry without a document");
            continue;
        };
        if !can_read(principal, &doc) {
            continue;
        }
        results.push(FinalResult {
            rank: results.len() + 1,
            score: hit.score,
            short_id: DocumentId::new(&doc.id).short,
            doc_id: doc.id,
            doc_num_id: hit.doc_num_id,
            title: doc.title,
            owner: doc.owner,
            tags: doc.tags,
            updated_at: doc.updated_at,
        });
    }

    debug!(
        user = %principal.user_id,
        results = results.len(),
        "text search"
    );
    Ok(results)
}

/// Format results for human-readable terminal output.
pub fn format_human(results: &[FinalResult]) -> String {
    if results.is_empty() {
        return "No results found.\n".to_string();
    }

    let mut out = String::new();
    for r in results {
        out.push_str(&format!(
            "{:>3}. [{:.3}] {} #{} ({})\n",
            r.rank, r.score, r.doc_id, r.short_id, r.owner
        ));
        if !r.title.is_empty() {
            out.push_str(&format!("     {}\n", r.title));
        }
    }
    out.push_str(&format!("\n{} result(s)\n", results.len()));
    out
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    query: &'a str,
    result_count: usize,
    results: &'a [FinalResult],
}

/// Format results as a JSON document.
pub fn format_json(results: &[FinalResult], query: &str) -> Result<String> {
    Ok(serde_json::to_string(&JsonOutput {
        query,
        result_count: results.len(),
        results,
    })?)
}

/// Format results as document ids, one per line.
pub fn format_ids(results: &[FinalResult]) -> String {
    results.iter().map(|r| format!("{}\n", r.doc_id)).collect()
}
