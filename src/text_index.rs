use std::{collections::HashSet, path::Path};

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    collector::TopDocs,
    query::{BooleanQuery, FuzzyTermQuery, Occur, Query, QueryParser},
    schema::*,
    tokenizer::{
        LowerCaser,
        RemoveLongFilter,
        SimpleTokenizer,
        Stemmer,
        TextAnalyzer,
    },
};

use crate::error::Result;

/// Field names used in the schema.
pub mod fields {
    pub const DOC_ID: &str = "doc_id";
    pub const DOC_NUM_ID: &str = "doc_num_id";
    pub const OWNER: &str = "owner";
    pub const TITLE: &str = "title";
    pub const BODY: &str = "body";
    pub const TAGS: &str = "tags";
    pub const UPDATED_AT: &str = "updated_at";
}

/// Memory budget for index writers, in bytes.
pub const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// Tantivy full-text index over document titles, bodies and tags.
pub struct TextIndex {
    index: Index,
    reader: IndexReader,
    fields: SchemaFields,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
pub struct SchemaFields {
    pub doc_id: Field,
    pub doc_num_id: Field,
    pub owner: Field,
    pub title: Field,
    pub body: Field,
    pub tags: Field,
    pub updated_at: Field,
}

/// A keyword search hit.
#[derive(Debug, Clone)]
pub struct TextHit {
    pub score: f32,
    pub doc_id: String,
    pub doc_num_id: u64,
    pub owner: String,
    pub title: String,
    pub updated_at: u64,
}

/// Fields of a document as written to the index.
#[derive(Debug, Clone, Copy)]
pub struct IndexedFields<'a> {
    pub doc_id: &'a str,
    pub doc_num_id: u64,
    pub owner: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub tags: &'a [String],
    pub updated_at: u64,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let doc_id = builder.add_text_field(fields::DOC_ID, STRING | STORED);
    let doc_num_id = builder.add_u64_field(fields::DOC_NUM_ID, STORED | FAST);
    let owner = builder.add_text_field(fields::OWNER, STRING | STORED);

    let stemmed = TextFieldIndexing::default()
        .set_tokenizer("en_stem")
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);

    let title = builder.add_text_field(
        fields::TITLE,
        TextOptions::default()
            .set_indexing_options(stemmed.clone())
            .set_stored(),
    );
    let body = builder.add_text_field(
        fields::BODY,
        TextOptions::default().set_indexing_options(stemmed.clone()),
    );
    let tags = builder.add_text_field(
        fields::TAGS,
        TextOptions::default().set_indexing_options(stemmed),
    );

    let updated_at = builder.add_u64_field(fields::UPDATED_AT, STORED | FAST);

    let schema = builder.build();
    let fields = SchemaFields {
        doc_id,
        doc_num_id,
        owner,
        title,
        body,
        tags,
        updated_at,
    };

    (schema, fields)
}

fn register_tokenizers(index: &Index) {
    let en_stem = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(tantivy::tokenizer::Language::English))
        .build();
    index.tokenizers().register("en_stem", en_stem);
}

impl TextIndex {
    /// Open or create a text index at the given directory.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, fields) = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(
                mmap_dir,
                schema,
                tantivy::IndexSettings::default(),
            )?
        };

        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    /// Create an in-memory index (for testing).
    pub fn open_in_ram() -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    /// Get the resolved field handles.
    pub fn fields(&self) -> SchemaFields {
        self.fields
    }

    pub fn writer(&self) -> Result<IndexWriter> {
        Ok(self.index.writer(WRITER_MEMORY_BUDGET)?)
    }

    /// Add a document, replacing any existing entry with the same `doc_id`.
    pub fn add_document(
        &self,
        writer: &IndexWriter,
        doc: IndexedFields<'_>,
    ) -> Result<()> {
        let f = self.fields();

        writer.delete_term(Term::from_field_text(f.doc_id, doc.doc_id));

        let mut indexed = TantivyDocument::default();
        indexed.add_text(f.doc_id, doc.doc_id);
        indexed.add_u64(f.doc_num_id, doc.doc_num_id);
        indexed.add_text(f.owner, doc.owner);
        indexed.add_text(f.title, doc.title);
        indexed.add_text(f.body, doc.body);
        for tag in doc.tags {
            indexed.add_text(f.tags, tag);
        }
        indexed.add_u64(f.updated_at, doc.updated_at);
        writer.add_document(indexed)?;

        Ok(())
    }

    /// Delete a single document by its external id.
    pub fn delete_document(&self, writer: &IndexWriter, doc_id: &str) {
        let f = self.fields();
        writer.delete_term(Term::from_field_text(f.doc_id, doc_id));
    }

    fn parser(&self) -> QueryParser {
        let f = self.fields();
        let mut parser =
            QueryParser::for_index(&self.index, vec![f.title, f.body, f.tags]);
        parser.set_field_boost(f.title, 2.0);
        parser
    }

    /// BM25 search over title (boosted 2x), body and tags.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<TextHit>> {
        let (query, _errors) = self.parser().parse_query_lenient(query_str);
        self.collect(&*query, limit)
    }

    /// BM25 combined with fuzzy matching.
    ///
    /// Each query term of three or more characters also matches body terms
    /// within Levenshtein distance 1.
    pub fn search_fuzzy(
        &self,
        query_str: &str,
        limit: usize,
    ) -> Result<Vec<TextHit>> {
        let f = self.fields();
        let (bm25_query, _errors) = self.parser().parse_query_lenient(query_str);

        let mut should: Vec<(Occur, Box<dyn Query>)> =
            vec![(Occur::Should, bm25_query)];
        for term_str in query_str.split_whitespace() {
            if term_str.chars().count() >= 3 {
                let term =
                    Term::from_field_text(f.body, &term_str.to_lowercase());
                should.push((
                    Occur::Should,
                    Box::new(FuzzyTermQuery::new(term, 1, true)),
                ));
            }
        }

        self.collect(&BooleanQuery::new(should), limit)
    }

    fn collect(&self, query: &dyn Query, limit: usize) -> Result<Vec<TextHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let f = self.fields();
        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let top_docs = searcher.search(query, &TopDocs::with_limit(limit))?;

        // Fuzzy and BM25 clauses can both match a document; keep the first.
        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let doc_id = extract_text(&doc, f.doc_id);
            if seen.insert(doc_id.clone()) {
                results.push(TextHit {
                    score,
                    doc_id,
                    doc_num_id: extract_u64(&doc, f.doc_num_id),
                    owner: extract_text(&doc, f.owner),
                    title: extract_text(&doc, f.title),
                    updated_at: extract_u64(&doc, f.updated_at),
                });
            }
        }

        Ok(results)
    }
}

impl std::fmt::Debug for TextIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextIndex").finish_non_exhaustive()
    }
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn extract_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
}
