use std::io::Read;

use clap::Parser;
use kbsearch::{
    DataDir,
    DocumentDb,
    DocumentId,
    Embedder,
    Library,
    TextIndex,
    VectorDb,
    access::{DocumentSummary, Principal, can_read},
    context::{self, ContextOptions},
    error::{self, Error},
    incremental,
    ingestion::{self, NewDocument},
    mcp,
    ranking::RankParams,
    search::{self, FinalResult, TextSearchParams},
    settings::{self, SearchSettings},
    text_index::IndexedFields,
};
use kdam::{BarExt, tqdm};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, DocAction, SettingsAction};

const USER_ENV_VAR: &str = "KBSEARCH_USER";

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("KBSEARCH_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let library = Library::new(
        DocumentDb::open(&data_dir.documents_db())?,
        VectorDb::open(&data_dir.vectors_db())?,
    );
    let settings = SearchSettings::resolve(&library.documents)?;

    match cli.command {
        Command::Doc { action } => {
            let principal = resolve_principal(cli.user.as_deref())?;
            match action {
                DocAction::Add(args) => {
                    let text_index = open_text_index(&data_dir)?;
                    cmd_doc_add(
                        &library,
                        &text_index,
                        &settings,
                        &principal,
                        args,
                    )?;
                }
                DocAction::Remove { id } => {
                    let text_index = open_text_index(&data_dir)?;
                    ingestion::delete_document(
                        &library,
                        &text_index,
                        &principal,
                        &id,
                    )?;
                    println!("Removed document '{id}'");
                }
                DocAction::Get { id, json, meta } => {
                    cmd_doc_get(&library, &principal, &id, json, meta)?;
                }
                DocAction::List { json } => {
                    cmd_doc_list(&library, &principal, json)?;
                }
            }
        }
        Command::Search(args) => {
            let principal = resolve_principal(cli.user.as_deref())?;
            let text_index = open_text_index(&data_dir)?;
            let params = TextSearchParams {
                query: args.query.clone(),
                count: args.count,
                min_score: args.min_score,
                no_fuzzy: args.no_fuzzy,
                all: args.all,
            };
            let results = search::execute_text_search(
                &params,
                &principal,
                &text_index,
                &library.documents,
            )?;
            print_results(&results, &args.query, args.json, args.ids)?;
        }
        Command::Ssearch(args) => {
            let principal = resolve_principal(cli.user.as_deref())?;
            let embedder = settings.embedder()?;
            let default_limit =
                i64::try_from(settings.limit).unwrap_or(i64::MAX);
            let params = RankParams::from_signed(
                args.threshold.unwrap_or(settings.threshold),
                args.count.unwrap_or(default_limit),
            );
            let results = search::execute_semantic_search(
                &args.query,
                params,
                &principal,
                &library,
                &embedder,
            )?;
            print_results(&results, &args.query, args.json, args.ids)?;
        }
        Command::Context(args) => {
            let principal = resolve_principal(cli.user.as_deref())?;
            let text_index = open_text_index(&data_dir)?;
            let embedder = settings.embedder()?;
            let qa = context::assemble_context(
                &args.question,
                &principal,
                &library,
                &text_index,
                &embedder,
                ContextOptions {
                    max_sources: args.max_sources,
                    max_chars_per_source: args.max_chars_per_source,
                    max_total_chars: args.max_total_chars,
                },
            )?;

            if args.json {
                println!("{}", serde_json::to_string(&qa)?);
            } else if qa.sources.is_empty() {
                println!("No relevant documents found.");
            } else {
                println!("{}\n", qa.context);
                println!("Sources:");
                for s in &qa.sources {
                    println!(
                        "  [{:.3}] {} ({:?})",
                        s.score, s.id, s.origin
                    );
                }
            }
        }
        Command::Reindex(args) => {
            cmd_reindex(&library, &data_dir, &settings, &args)?;
        }
        Command::Status(args) => {
            cmd_status(&library, &data_dir, &settings, args.json)?;
        }
        Command::Settings { action } => match action {
            SettingsAction::Show { json } => {
                cmd_settings_show(&library.documents, &settings, json)?;
            }
            SettingsAction::Set { key, value } => {
                SearchSettings::store(&library.documents, &key, &value)?;
                println!("Set {key} = {value}");
                if key == settings::keys::DIMENSION {
                    eprintln!(
                        "Run `kbsearch reindex` to recompute stored vectors."
                    );
                }
            }
        },
        Command::Mcp => {
            mcp::run_mcp(&data_dir, library, settings)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn resolve_principal(explicit: Option<&str>) -> error::Result<Principal> {
    let user = explicit
        .map(str::to_string)
        .or_else(|| std::env::var(USER_ENV_VAR).ok())
        .or_else(|| std::env::var("USER").ok())
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| {
            Error::Config(format!(
                "no user given; pass --user or set {USER_ENV_VAR}"
            ))
        })?;
    Ok(Principal::new(user))
}

fn open_text_index(data_dir: &DataDir) -> error::Result<TextIndex> {
    TextIndex::open(&data_dir.text_index_dir()?)
}

fn print_results(
    results: &[FinalResult],
    query: &str,
    json: bool,
    ids: bool,
) -> error::Result<()> {
    if json {
        println!("{}", search::format_json(results, query)?);
    } else if ids {
        print!("{}", search::format_ids(results));
    } else {
        print!("{}", search::format_human(results));
    }
    Ok(())
}

fn cmd_doc_add(
    library: &Library,
    text_index: &TextIndex,
    settings: &SearchSettings,
    principal: &Principal,
    args: cli::DocAddArgs,
) -> error::Result<()> {
    let collaborators = args.collaborator_list();
    let visibility = args.visibility();
    let content = match (args.content, args.file) {
        (Some(content), _) => content,
        (None, Some(path)) => std::fs::read_to_string(&path)?,
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let embedder = settings.embedder()?;
    let report = ingestion::save_document(
        library,
        text_index,
        &embedder,
        principal,
        NewDocument {
            id: args.id.clone(),
            title: args.title,
            content,
            tags: args.tags,
            collaborators,
            visibility,
        },
    )?;

    let action = if report.created { "Added" } else { "Updated" };
    let vector = if report.reembedded {
        "vector recomputed"
    } else {
        "vector unchanged"
    };
    println!("{action} document '{}' {} ({vector})", args.id, report.doc_id);
    Ok(())
}

fn cmd_doc_get(
    library: &Library,
    principal: &Principal,
    id: &str,
    json: bool,
    meta: bool,
) -> error::Result<()> {
    let doc_id = DocumentId::new(id);
    let doc =
        library
            .documents
            .get(doc_id.numeric)?
            .ok_or_else(|| Error::NotFound {
                kind: "document",
                name: id.to_string(),
            })?;
    if !can_read(principal, &doc) {
        return Err(Error::Forbidden {
            principal: principal.user_id.clone(),
            document: doc.id,
        });
    }

    if json {
        let mut value = serde_json::to_value(&doc)?;
        if meta && let Some(obj) = value.as_object_mut() {
            obj.remove("content");
        }
        println!("{value}");
    } else if meta {
        println!("id: {}", doc.id);
        println!("short_id: {doc_id}");
        println!("title: {}", doc.title);
        println!("owner: {}", doc.owner);
        println!("visibility: {}", doc.visibility);
        println!("tags: {}", doc.tags.join(", "));
        println!("collaborators: {}", doc.collaborators.join(", "));
        println!("updated_at: {}", doc.updated_at);
    } else {
        print!("{}", doc.content);
        if !doc.content.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn cmd_doc_list(
    library: &Library,
    principal: &Principal,
    json: bool,
) -> error::Result<()> {
    let mut docs: Vec<_> = library
        .documents
        .list()?
        .into_iter()
        .filter(|(_, doc)| can_read(principal, doc))
        .map(|(num, doc)| DocumentSummary::from_stored(num, &doc))
        .collect();
    docs.sort_by(|a, b| a.id.cmp(&b.id));

    if json {
        println!("{}", serde_json::to_string(&docs)?);
    } else if docs.is_empty() {
        println!("No documents.");
    } else {
        for d in &docs {
            println!(
                "{}\t{}\t{}\t{}",
                d.id,
                DocumentId::new(&d.id),
                d.owner,
                d.title
            );
        }
    }
    Ok(())
}

fn cmd_reindex(
    library: &Library,
    data_dir: &DataDir,
    settings: &SearchSettings,
    args: &cli::ReindexArgs,
) -> error::Result<()> {
    let embedder = settings.embedder()?;
    let diff = incremental::diff_vectors(library, embedder.dimension())?;

    let ids = if args.force {
        library.documents.list_ids()?
    } else {
        diff.needs_embedding()
    };

    if ids.is_empty() {
        eprintln!("All vectors are current.");
    } else {
        let mut pb = tqdm!(total = ids.len(), desc = "Embedding");
        let written = incremental::reembed_stale(
            library,
            &embedder,
            &ids,
            args.batch_size,
            |n| {
                pb.update(n).ok();
            },
        )?;
        eprintln!();
        info!(written, dimension = embedder.dimension(), "reindexed vectors");
    }

    incremental::remove_orphans(library, &diff.orphaned)?;

    if args.text {
        let text_index = open_text_index(data_dir)?;
        let mut writer = text_index.writer()?;
        let documents = library.documents.list()?;
        for (num, doc) in &documents {
            text_index.add_document(
                &writer,
                IndexedFields {
                    doc_id: &doc.id,
                    doc_num_id: *num,
                    owner: &doc.owner,
                    title: &doc.title,
                    body: &doc.content,
                    tags: &doc.tags,
                    updated_at: doc.updated_at,
                },
            )?;
        }
        writer.commit()?;
        eprintln!(
            "Re-indexed {} documents for keyword search",
            documents.len()
        );
    }

    Ok(())
}

fn cmd_status(
    library: &Library,
    data_dir: &DataDir,
    settings: &SearchSettings,
    json: bool,
) -> error::Result<()> {
    let doc_count = library.documents.list_ids()?.len();
    let dimensions = library.vectors.dimension_counts()?;
    let diff = incremental::diff_vectors(library, settings.dimension)?;

    if json {
        let dimensions: serde_json::Map<String, serde_json::Value> = dimensions
            .iter()
            .map(|(dim, count)| (dim.to_string(), json!(count)))
            .collect();
        let value = json!({
            "data_dir": data_dir.root().display().to_string(),
            "documents": doc_count,
            "vector_dimensions": dimensions,
            "missing_vectors": diff.missing.len(),
            "stale_vectors": diff.stale_dimension.len(),
            "orphaned_vectors": diff.orphaned.len(),
            "settings": settings_json(settings),
        });
        println!("{value}");
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Documents: {doc_count}");
        println!("Vectors:");
        for (dim, count) in &dimensions {
            println!("  {dim} dimensions: {count}");
        }
        println!("Missing vectors: {}", diff.missing.len());
        println!("Stale vectors: {}", diff.stale_dimension.len());
        println!("Orphaned vectors: {}", diff.orphaned.len());
        if !diff.is_clean() {
            println!("Run `kbsearch reindex` to repair.");
        }
    }
    Ok(())
}

fn settings_json(settings: &SearchSettings) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert(settings::keys::DIMENSION.into(), json!(settings.dimension));
    map.insert(settings::keys::THRESHOLD.into(), json!(settings.threshold));
    map.insert(settings::keys::LIMIT.into(), json!(settings.limit));
    serde_json::Value::Object(map)
}

fn cmd_settings_show(
    documents: &DocumentDb,
    settings: &SearchSettings,
    json: bool,
) -> error::Result<()> {
    let stored = documents.list_settings()?;

    if json {
        let stored: serde_json::Map<String, serde_json::Value> = stored
            .into_iter()
            .map(|(key, value)| (key, json!(value)))
            .collect();
        println!(
            "{}",
            json!({ "resolved": settings_json(settings), "stored": stored })
        );
    } else {
        println!("{}: {}", settings::keys::DIMENSION, settings.dimension);
        println!("{}: {}", settings::keys::THRESHOLD, settings.threshold);
        println!("{}: {}", settings::keys::LIMIT, settings.limit);
        if !stored.is_empty() {
            println!("\nStored in documents.redb:");
            for (key, value) in &stored {
                println!("  {key} = {value}");
            }
        }
    }
    Ok(())
}
