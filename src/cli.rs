use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use kbsearch::document_db::Visibility;

#[derive(Debug, Parser)]
#[command(
    name = "kbsearch",
    about = "Semantic and keyword search for a team knowledge base"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// User to act as (defaults to $KBSEARCH_USER, then $USER)
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage documents
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },
    /// Keyword search (BM25 with fuzzy matching)
    Search(SearchArgs),
    /// Semantic search by embedding similarity
    #[command(name = "ssearch")]
    Ssearch(SemanticSearchArgs),
    /// Assemble question-answering context from relevant documents
    Context(ContextArgs),
    /// Recompute missing or stale document vectors
    Reindex(ReindexArgs),
    /// Show system status and statistics
    Status(StatusArgs),
    /// Show or change persisted search settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Documents --

#[derive(Debug, Subcommand)]
pub enum DocAction {
    /// Create or update a document
    Add(DocAddArgs),
    /// Delete a document (owner only)
    Remove {
        /// Document id
        id: String,
    },
    /// Print a document
    Get {
        /// Document id
        id: String,
        /// Output as JSON with metadata
        #[arg(long)]
        json: bool,
        /// Print only metadata
        #[arg(long)]
        meta: bool,
    },
    /// List documents readable by the current user
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Parser)]
pub struct DocAddArgs {
    /// Document id
    pub id: String,

    /// Read content from this file (stdin when neither --file nor
    /// --content is given)
    #[arg(short, long, conflicts_with = "content")]
    pub file: Option<PathBuf>,

    /// Inline document content
    #[arg(long)]
    pub content: Option<String>,

    /// Title (defaults to the first markdown heading)
    #[arg(long)]
    pub title: Option<String>,

    /// Tag to attach (repeatable)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// User allowed to read and edit (repeatable; replaces the stored
    /// list)
    #[arg(long = "collaborator")]
    pub collaborators: Vec<String>,

    /// Remove every collaborator
    #[arg(long, conflicts_with = "collaborators")]
    pub clear_collaborators: bool,

    /// Make the document readable by everyone
    #[arg(long, conflicts_with = "private")]
    pub public: bool,

    /// Restrict the document to its owner and collaborators
    #[arg(long)]
    pub private: bool,
}

impl DocAddArgs {
    /// Requested visibility; `None` keeps the current one.
    pub fn visibility(&self) -> Option<Visibility> {
        if self.public {
            Some(Visibility::Public)
        } else if self.private {
            Some(Visibility::Private)
        } else {
            None
        }
    }

    /// Requested collaborator list; `None` keeps the current one.
    pub fn collaborator_list(&self) -> Option<Vec<String>> {
        if self.clear_collaborators {
            Some(Vec::new())
        } else if self.collaborators.is_empty() {
            None
        } else {
            Some(self.collaborators.clone())
        }
    }
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Return all results above the score threshold
    #[arg(long)]
    pub all: bool,

    /// Output only document ids (one per line)
    #[arg(long)]
    pub ids: bool,

    /// Minimum score threshold
    #[arg(long, default_value = "0.0")]
    pub min_score: f32,

    /// Disable fuzzy matching
    #[arg(long)]
    pub no_fuzzy: bool,
}

// -- Semantic-only Search --

#[derive(Debug, Parser)]
pub struct SemanticSearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return (default from settings)
    #[arg(short = 'n', long, allow_negative_numbers = true)]
    pub count: Option<i64>,

    /// Minimum cosine similarity (default from settings)
    #[arg(short, long, allow_negative_numbers = true)]
    pub threshold: Option<f32>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Output only document ids (one per line)
    #[arg(long)]
    pub ids: bool,
}

// -- Context --

#[derive(Debug, Parser)]
pub struct ContextArgs {
    /// The question to gather context for
    pub question: String,

    /// Maximum number of source documents
    #[arg(long, default_value = "5")]
    pub max_sources: usize,

    /// Maximum characters taken from each source
    #[arg(long, default_value = "2000")]
    pub max_chars_per_source: usize,

    /// Maximum characters in the whole context
    #[arg(long, default_value = "8000")]
    pub max_total_chars: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Reindex --

#[derive(Debug, Parser)]
pub struct ReindexArgs {
    /// Recompute every vector, not only missing or stale ones
    #[arg(long)]
    pub force: bool,

    /// Documents embedded per transaction
    #[arg(long, default_value = "64")]
    pub batch_size: usize,

    /// Also rebuild the keyword index from stored documents
    #[arg(long)]
    pub text: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Settings --

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Show the resolved settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a setting in documents.redb
    Set {
        /// One of embedding_dimension, default_threshold, default_limit
        key: String,
        value: String,
    },
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "kbsearch",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_ssearch_defaults() {
        let cli = Cli::parse_from(["kbsearch", "ssearch", "hello"]);
        match cli.command {
            Command::Ssearch(args) => {
                assert_eq!(args.query, "hello");
                assert_eq!(args.count, None);
                assert_eq!(args.threshold, None);
                assert!(!args.json);
                assert!(!args.ids);
            }
            _ => panic!("expected ssearch command"),
        }
    }

    #[test]
    fn parse_ssearch_negative_limit() {
        let cli = Cli::parse_from([
            "kbsearch", "ssearch", "hello", "-n", "-3", "-t", "-0.5",
        ]);
        match cli.command {
            Command::Ssearch(args) => {
                assert_eq!(args.count, Some(-3));
                assert_eq!(args.threshold, Some(-0.5));
            }
            _ => panic!("expected ssearch command"),
        }
    }

    #[test]
    fn parse_doc_add() {
        let cli = Cli::parse_from([
            "kbsearch",
            "--user",
            "alice",
            "doc",
            "add",
            "vpn",
            "--content",
            "vpn setup",
            "-t",
            "it",
            "--tag",
            "network",
            "--collaborator",
            "bob",
            "--public",
        ]);
        assert_eq!(cli.user.as_deref(), Some("alice"));
        match cli.command {
            Command::Doc {
                action: DocAction::Add(args),
            } => {
                assert_eq!(args.id, "vpn");
                assert_eq!(args.content.as_deref(), Some("vpn setup"));
                assert_eq!(args.tags, vec!["it", "network"]);
                assert_eq!(args.collaborators, vec!["bob"]);
                assert_eq!(args.visibility(), Some(Visibility::Public));
                assert_eq!(
                    args.collaborator_list(),
                    Some(vec!["bob".to_string()])
                );
            }
            _ => panic!("expected doc add command"),
        }
    }

    #[test]
    fn doc_add_without_sharing_flags_keeps_sharing() {
        let cli = Cli::parse_from([
            "kbsearch", "doc", "add", "vpn", "--content", "vpn setup",
        ]);
        match cli.command {
            Command::Doc {
                action: DocAction::Add(args),
            } => {
                assert_eq!(args.visibility(), None);
                assert_eq!(args.collaborator_list(), None);
            }
            _ => panic!("expected doc add command"),
        }
    }

    #[test]
    fn doc_add_private_and_clear_collaborators() {
        let cli = Cli::parse_from([
            "kbsearch",
            "doc",
            "add",
            "vpn",
            "--content",
            "vpn setup",
            "--private",
            "--clear-collaborators",
        ]);
        match cli.command {
            Command::Doc {
                action: DocAction::Add(args),
            } => {
                assert_eq!(args.visibility(), Some(Visibility::Private));
                assert_eq!(args.collaborator_list(), Some(Vec::new()));
            }
            _ => panic!("expected doc add command"),
        }
    }

    #[test]
    fn public_and_private_conflict() {
        let result = Cli::try_parse_from([
            "kbsearch", "doc", "add", "vpn", "--public", "--private",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
