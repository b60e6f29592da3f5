//! Context assembly for question answering.
//!
//! Gathers the documents most relevant to a question, restricted to what
//! the asking principal may read, and concatenates their text into a single
//! bounded context block. Generating an answer from the block is left to
//! the caller.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::{
    access::{Library, Principal},
    embedding::Embedder,
    error::Result,
    ranking::RankParams,
    search::{
        FinalResult,
        TextSearchParams,
        execute_semantic_search,
        execute_text_search,
    },
    text_index::TextIndex,
    text_util::truncate_chars,
};

/// Minimum similarity for semantic hits used to top up the context.
pub const CONTEXT_SEMANTIC_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextOptions {
    pub max_sources: usize,
    pub max_chars_per_source: usize,
    pub max_total_chars: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            max_sources: 5,
            max_chars_per_source: 2000,
            max_total_chars: 8000,
        }
    }
}

/// Which retrieval path found a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceOrigin {
    Text,
    Semantic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSource {
    pub id: String,
    pub title: String,
    pub score: f32,
    pub origin: SourceOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaContext {
    pub question: String,
    pub sources: Vec<ContextSource>,
    pub context: String,
}

/// Collect sources for `question` and build the context block.
///
/// Keyword hits come first; semantic hits scoring at least
/// [`CONTEXT_SEMANTIC_THRESHOLD`] fill the remaining slots. Each source
/// contributes its title and at most `max_chars_per_source` characters of
/// content, and sources stop being added once `max_total_chars` is spent.
/// A source is dropped when its header and at least one character of its
/// content no longer fit.
pub fn assemble_context(
    question: &str,
    principal: &Principal,
    library: &Library,
    text_index: &TextIndex,
    embedder: &dyn Embedder,
    options: ContextOptions,
) -> Result<QaContext> {
    let mut picked: Vec<(FinalResult, SourceOrigin)> = Vec::new();
    let mut seen = HashSet::new();

    let text_hits = execute_text_search(
        &TextSearchParams::new(question, options.max_sources),
        principal,
        text_index,
        &library.documents,
    )?;
    for hit in text_hits {
        if seen.insert(hit.doc_num_id) {
            picked.push((hit, SourceOrigin::Text));
        }
    }

    if picked.len() < options.max_sources {
        let semantic_hits = execute_semantic_search(
            question,
            RankParams {
                threshold: CONTEXT_SEMANTIC_THRESHOLD,
                limit: options.max_sources,
            },
            principal,
            library,
            embedder,
        )?;
        for hit in semantic_hits {
            if picked.len() >= options.max_sources {
                break;
            }
            if seen.insert(hit.doc_num_id) {
                picked.push((hit, SourceOrigin::Semantic));
            }
        }
    }

    let mut sources = Vec::with_capacity(picked.len());
    let mut context = String::new();
    let mut used = 0;
    for (hit, origin) in picked {
        let remaining = options.max_total_chars.saturating_sub(used);
        if remaining == 0 {
            break;
        }
        let Some(doc) = library.documents.get(hit.doc_num_id)? else {
            continue;
        };

        let header = format!("## {}\n", doc.title);
        if remaining <= header.chars().count() {
            debug!(doc = %doc.id, remaining, "no room left for source");
            continue;
        }

        let body = truncate_chars(&doc.content, options.max_chars_per_source);
        let block = format!("{header}{body}\n\n");
        let block: String = block.chars().take(remaining).collect();
        used += block.chars().count();
        context.push_str(&block);

        sources.push(ContextSource {
            id: hit.doc_id,
            title: hit.title,
            score: hit.score,
            origin,
        });
    }

    debug!(
        user = %principal.user_id,
        sources = sources.len(),
        chars = used,
        "assembled context"
    );

    Ok(QaContext {
        question: question.to_string(),
        sources,
        context: context.trim_end().to_string(),
    })
}
