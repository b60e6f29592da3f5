use std::path::{Path, PathBuf};

use kbsearch::{
    DataDir,
    DocumentDb,
    HashEmbedder,
    Library,
    TextIndex,
    VectorDb,
    access::Principal,
    document_db::Visibility,
    ingestion::{NewDocument, save_document},
};
use rmcp::{
    ServiceExt,
    model::CallToolRequestParams,
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde_json::json;

fn setup_fixture(root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = DataDir::resolve(Some(root))?;
    let library = Library::new(
        DocumentDb::open(&data_dir.documents_db())?,
        VectorDb::open(&data_dir.vectors_db())?,
    );
    let text_index = TextIndex::open(&data_dir.text_index_dir()?)?;
    let embedder = HashEmbedder::default();

    for (owner, id, content, visibility) in [
        (
            "alice",
            "ml-infra",
            "deep learning infrastructure",
            Visibility::Public,
        ),
        ("alice", "release", "release checklist", Visibility::Private),
        ("bob", "pasta", "pasta", Visibility::Public),
    ] {
        save_document(
            &library,
            &text_index,
            &embedder,
            &Principal::new(owner),
            NewDocument {
                id: id.to_string(),
                content: content.to_string(),
                visibility: Some(visibility),
                ..NewDocument::default()
            },
        )?;
    }

    Ok(())
}

fn results(
    result: &rmcp::model::CallToolResult,
) -> Vec<serde_json::Value> {
    result
        .structured_content
        .as_ref()
        .and_then(|s| s.get("results"))
        .and_then(|v| v.as_array())
        .cloned()
        .expect("results array")
}

#[tokio::test]
async fn mcp_stdio_search_roundtrip() -> Result<(), Box<dyn std::error::Error>>
{
    let tempdir = tempfile::tempdir()?;
    setup_fixture(tempdir.path())?;

    let bin = kbsearch_bin()?;
    let transport = TokioChildProcess::new(
        tokio::process::Command::new(bin).configure(|cmd| {
            cmd.arg("mcp")
                .env("KBSEARCH_DATA_DIR", tempdir.path())
                .env("KBSEARCH_LOG", "warn");
        }),
    )?;

    let client = ().serve(transport).await?;

    let args = json!({
        "user": "bob",
        "query": "machine learning systems"
    });
    let semantic = client
        .peer()
        .call_tool(CallToolRequestParams::new("kb_semantic_search").with_arguments(args.as_object().unwrap().clone()))
        .await?;

    let semantic = results(&semantic);
    assert_eq!(semantic.len(), 1);
    assert_eq!(
        semantic[0].get("docId").and_then(|v| v.as_str()),
        Some("ml-infra")
    );

    let args = json!({
        "user": "bob",
        "query": "checklist",
        "noFuzzy": true,
        "includeSnippet": false
    });
    let hidden = client
        .peer()
        .call_tool(CallToolRequestParams::new("kb_search").with_arguments(args.as_object().unwrap().clone()))
        .await?;
    assert!(results(&hidden).is_empty());

    let args = json!({
        "user": "alice",
        "query": "checklist",
        "noFuzzy": true,
        "includeSnippet": false
    });
    let visible = client
        .peer()
        .call_tool(CallToolRequestParams::new("kb_search").with_arguments(args.as_object().unwrap().clone()))
        .await?;
    let visible = results(&visible);
    assert_eq!(visible.len(), 1);
    assert_eq!(
        visible[0].get("docId").and_then(|v| v.as_str()),
        Some("release")
    );

    let args = json!({
        "user": "alice",
        "question": "what is on the release checklist"
    });
    let context = client
        .peer()
        .call_tool(CallToolRequestParams::new("kb_context").with_arguments(args.as_object().unwrap().clone()))
        .await?;
    let text = context
        .content
        .first()
        .and_then(|c| c.as_text())
        .map(|t| t.text.clone())
        .unwrap_or_default();
    assert!(text.contains("release checklist"));

    client.cancel().await?;
    Ok(())
}

fn kbsearch_bin() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(bin) = option_env!("CARGO_BIN_EXE_kbsearch") {
        return Ok(PathBuf::from(bin));
    }

    let mut path = std::env::current_exe()?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("kbsearch");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    Ok(path)
}
