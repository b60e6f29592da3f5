//! kbsearch - semantic and keyword search for a team knowledge base.
//!
//! Documents are embedded with a deterministic hashing scheme and ranked by
//! cosine similarity against the query, restricted to what the searching
//! user may read. A [Tantivy](https://github.com/quickwit-oss/tantivy) index
//! provides keyword search alongside, and both feed a context assembler for
//! question answering.
//!
//! # Quick start
//!
//! ```no_run
//! use kbsearch::{DataDir, DocumentDb, Library, TextIndex, VectorDb};
//! use kbsearch::access::Principal;
//! use kbsearch::ingestion::{self, NewDocument};
//! use kbsearch::search;
//! use kbsearch::settings::SearchSettings;
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let library = Library::new(
//!     DocumentDb::open(&data_dir.documents_db()).unwrap(),
//!     VectorDb::open(&data_dir.vectors_db()).unwrap(),
//! );
//! let text_index = TextIndex::open(&data_dir.text_index_dir().unwrap()).unwrap();
//! let settings = SearchSettings::resolve(&library.documents).unwrap();
//! let embedder = settings.embedder().unwrap();
//! let alice = Principal::new("alice");
//!
//! ingestion::save_document(
//!     &library,
//!     &text_index,
//!     &embedder,
//!     &alice,
//!     NewDocument {
//!         id: "ml-infra".to_string(),
//!         content: "deep learning infrastructure".to_string(),
//!         ..NewDocument::default()
//!     },
//! )
//! .unwrap();
//!
//! let results = search::execute_semantic_search(
//!     "machine learning systems",
//!     settings.rank_params(),
//!     &alice,
//!     &library,
//!     &embedder,
//! )
//! .unwrap();
//! for r in &results {
//!     println!("{} (score: {:.3})", r.doc_id, r.score);
//! }
//! ```

pub mod access;
pub mod context;
pub mod data_dir;
pub mod doc_id;
pub mod document_db;
pub mod embedding;
pub mod error;
pub mod incremental;
pub mod ingestion;
pub mod mcp;
pub mod ranking;
pub mod search;
pub mod settings;
pub mod similarity;
pub mod text_index;
pub mod text_util;
pub mod vector_db;

pub use access::Library;
pub use data_dir::DataDir;
pub use doc_id::DocumentId;
pub use document_db::DocumentDb;
pub use embedding::{Embedder, HashEmbedder};
pub use error::{Error, Result};
pub use text_index::TextIndex;
pub use vector_db::VectorDb;
