use std::sync::Arc;

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::{
    access::{Library, Principal},
    context::{self, ContextOptions},
    data_dir::DataDir,
    embedding::HashEmbedder,
    error,
    ranking::RankParams,
    search::{self, FinalResult, TextSearchParams},
    settings::SearchSettings,
    text_index::TextIndex,
    text_util::{add_line_numbers, extract_snippet},
};

/// Line-numbered snippet of a hit's content around the query terms.
fn snippet_for(
    library: &Library,
    hit: &FinalResult,
    query: &str,
) -> Option<String> {
    let doc = match library.documents.get(hit.doc_num_id) {
        Ok(doc) => doc?,
        Err(e) => {
            warn!(doc = %hit.doc_id, error = %e, "failed to load snippet");
            return None;
        }
    };
    let (snippet, start_line) = extract_snippet(&doc.content, query)?;
    Some(add_line_numbers(&snippet, start_line))
}

struct KbState {
    library: Library,
    text_index: TextIndex,
    settings: SearchSettings,
    embedder: HashEmbedder,
}

#[derive(Clone)]
pub struct KbMcpServer {
    state: Arc<KbState>,
    tool_router: ToolRouter<Self>,
}

impl KbMcpServer {
    fn new(state: KbState) -> Self {
        Self {
            state: Arc::new(state),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl KbMcpServer {
    /// Rank readable documents by embedding similarity to the query.
    #[tool(
        name = "kb_semantic_search",
        description = "Semantic search over the knowledge base. Returns documents the user may read whose similarity to the query is at least the threshold, best first."
    )]
    pub async fn kb_semantic_search(
        &self,
        params: Parameters<SemanticSearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let defaults = self.state.settings;
        let default_limit = i64::try_from(defaults.limit).unwrap_or(i64::MAX);
        let rank_params = RankParams::from_signed(
            params.threshold.unwrap_or(defaults.threshold),
            params.limit.unwrap_or(default_limit),
        );

        let results = search::execute_semantic_search(
            &params.query,
            rank_params,
            &Principal::new(params.user),
            &self.state.library,
            &self.state.embedder,
        )
        .map_err(|e| mcp_error("semantic search failed", e))?;

        let items: Vec<SearchResultItem> =
            results.into_iter().map(|r| item(r, None)).collect();
        search_result(params.query, items)
    }

    /// Keyword search with BM25 and fuzzy matching.
    #[tool(
        name = "kb_search",
        description = "Keyword search over the knowledge base with fuzzy matching. Only documents the user may read are returned."
    )]
    pub async fn kb_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let text_params = TextSearchParams {
            query: params.query.clone(),
            count: params.limit.unwrap_or(self.state.settings.limit),
            min_score: params.min_score.unwrap_or(0.0),
            no_fuzzy: params.no_fuzzy.unwrap_or(false),
            all: params.all.unwrap_or(false),
        };

        let results = search::execute_text_search(
            &text_params,
            &Principal::new(params.user),
            &self.state.text_index,
            &self.state.library.documents,
        )
        .map_err(|e| mcp_error("search failed", e))?;

        let include_snippet = params.include_snippet.unwrap_or(true);
        let mut items = Vec::with_capacity(results.len());
        for r in results {
            let snippet = if include_snippet {
                snippet_for(&self.state.library, &r, &params.query)
            } else {
                None
            };
            items.push(item(r, snippet));
        }

        search_result(params.query, items)
    }

    /// Gather bounded context for answering a question.
    #[tool(
        name = "kb_context",
        description = "Collect the documents most relevant to a question and return their text as a single context block, with the list of sources used."
    )]
    pub async fn kb_context(
        &self,
        params: Parameters<ContextParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let defaults = ContextOptions::default();
        let options = ContextOptions {
            max_sources: params.max_sources.unwrap_or(defaults.max_sources),
            max_chars_per_source: params
                .max_chars_per_source
                .unwrap_or(defaults.max_chars_per_source),
            max_total_chars: params
                .max_total_chars
                .unwrap_or(defaults.max_total_chars),
        };

        let qa = context::assemble_context(
            &params.question,
            &Principal::new(params.user),
            &self.state.library,
            &self.state.text_index,
            &self.state.embedder,
            options,
        )
        .map_err(|e| mcp_error("context assembly failed", e))?;

        let structured = serde_json::to_value(&qa)
            .map_err(|e| mcp_error("failed to serialize context", e))?;
        let text = if qa.context.is_empty() {
            format!("No context found for \"{}\"", qa.question)
        } else {
            qa.context
        };

        Ok({
            let mut result = CallToolResult::success(vec![Content::text(text)]);
            result.structured_content = Some(structured);
            result
        })
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for KbMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("kbsearch", env!("CARGO_PKG_VERSION"))
                    .with_title("kbsearch MCP"),
            )
            .with_instructions(
                "Use kb_semantic_search to find documents by meaning, kb_search for exact terms, and kb_context to gather material for answering a question. Always pass the id of the user you act for.",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SemanticSearchParams {
    /// Id of the user the search runs for.
    pub user: String,
    /// Search query string.
    pub query: String,
    /// Maximum number of results (default: 10). Negative values return
    /// nothing.
    pub limit: Option<i64>,
    /// Minimum cosine similarity, inclusive (default: 0.7).
    pub threshold: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Id of the user the search runs for.
    pub user: String,
    /// Search query string.
    pub query: String,
    /// Maximum number of results (default: 10).
    pub limit: Option<usize>,
    /// Minimum score threshold.
    pub min_score: Option<f32>,
    /// Disable fuzzy matching.
    pub no_fuzzy: Option<bool>,
    /// Return all results above the score threshold.
    pub all: Option<bool>,
    /// Include a snippet preview (default: true).
    pub include_snippet: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextParams {
    /// Id of the user the question is asked for.
    pub user: String,
    /// The question to gather context for.
    pub question: String,
    /// Maximum number of source documents (default: 5).
    pub max_sources: Option<usize>,
    /// Maximum characters per source (default: 2000).
    pub max_chars_per_source: Option<usize>,
    /// Maximum characters overall (default: 8000).
    pub max_total_chars: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    query: String,
    result_count: usize,
    results: Vec<SearchResultItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResultItem {
    rank: usize,
    doc_id: String,
    short_id: String,
    title: String,
    owner: String,
    tags: Vec<String>,
    score: f32,
    updated_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    snippet: Option<String>,
}

fn item(r: FinalResult, snippet: Option<String>) -> SearchResultItem {
    SearchResultItem {
        rank: r.rank,
        doc_id: r.doc_id,
        short_id: format!("#{}", r.short_id),
        title: r.title,
        owner: r.owner,
        tags: r.tags,
        score: r.score,
        updated_at: r.updated_at,
        snippet,
    }
}

fn search_result(
    query: String,
    items: Vec<SearchResultItem>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let summary = format_search_summary(&items, &query);
    let structured = serde_json::to_value(SearchResponse {
        query,
        result_count: items.len(),
        results: items,
    })
    .map_err(|e| mcp_error("failed to serialize search results", e))?;

    Ok({
        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        result
    })
}

fn format_search_summary(results: &[SearchResultItem], query: &str) -> String {
    if results.is_empty() {
        return format!("No results found for \"{query}\"");
    }

    let mut lines = Vec::with_capacity(results.len() + 1);
    let suffix = if results.len() == 1 { "" } else { "s" };
    lines.push(format!(
        "Found {} result{} for \"{query}\":",
        results.len(),
        suffix
    ));

    for item in results {
        lines.push(format!(
            "{} {:.3} {} ({})",
            item.short_id, item.score, item.doc_id, item.title
        ));
    }

    lines.join("\n")
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(
    data_dir: &DataDir,
    library: Library,
    settings: SearchSettings,
) -> error::Result<()> {
    let text_index = TextIndex::open(&data_dir.text_index_dir()?)?;

    let state = KbState {
        library,
        text_index,
        settings,
        embedder: settings.embedder()?,
    };

    let server = KbMcpServer::new(state);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}
