use std::path::Path;

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    collector::TopDocs,
    doc,
    query::QueryParser,
    schema::*,
    tokenizer::{
        LowerCaser,
        RemoveLongFilter,
        SimpleTokenizer,
        Stemmer,
        TextAnalyzer,
    },
};

use crate::{error::Result, table_store::TableRecord};

/// Field names used in the schema.
pub mod fields {
    pub const DOCNO: &str = "docno";
    pub const PAGE_TITLE: &str = "page_title";
    pub const TABLE_TITLE: &str = "table_title";
    pub const HEADER: &str = "header";
    pub const CONTENT: &str = "content";
    pub const TEXT_BEFORE: &str = "text_before";
    pub const TEXT_AFTER: &str = "text_after";
}

/// The base retrieval collaborator: a Tantivy BM25 index over the six text
/// fields of a table record. Everything downstream consumes only the ranked
/// (docno, score) list it returns.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    schema: Schema,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
pub struct SchemaFields {
    pub docno: Field,
    pub page_title: Field,
    pub table_title: Field,
    pub header: Field,
    pub content: Field,
    pub text_before: Field,
    pub text_after: Field,
}

/// One ranked hit from base retrieval.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub docno: String,
    pub score: f32,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let docno = builder.add_text_field(fields::DOCNO, STRING | STORED);

    let indexed = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("en_stem")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let page_title =
        builder.add_text_field(fields::PAGE_TITLE, indexed.clone());
    let table_title =
        builder.add_text_field(fields::TABLE_TITLE, indexed.clone());
    let header = builder.add_text_field(fields::HEADER, indexed.clone());
    let content = builder.add_text_field(fields::CONTENT, indexed.clone());
    let text_before =
        builder.add_text_field(fields::TEXT_BEFORE, indexed.clone());
    let text_after = builder.add_text_field(fields::TEXT_AFTER, indexed);

    let schema = builder.build();
    let fields = SchemaFields {
        docno,
        page_title,
        table_title,
        header,
        content,
        text_before,
        text_after,
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

impl SearchIndex {
    /// Open or create a search index at the given directory.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, _) = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(
                mmap_dir,
                schema.clone(),
                tantivy::IndexSettings::default(),
            )?
        };

        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            schema,
        })
    }

    /// Create an in-memory search index (for testing).
    pub fn open_in_ram() -> Result<Self> {
        let (schema, _) = build_schema();
        let index = Index::create_in_ram(schema.clone());
        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            schema,
        })
    }

    /// Get the resolved field handles.
    pub fn fields(&self) -> SchemaFields {
        let f = |name: &str| self.schema.get_field(name).unwrap();
        SchemaFields {
            docno: f(fields::DOCNO),
            page_title: f(fields::PAGE_TITLE),
            table_title: f(fields::TABLE_TITLE),
            header: f(fields::HEADER),
            content: f(fields::CONTENT),
            text_before: f(fields::TEXT_BEFORE),
            text_after: f(fields::TEXT_AFTER),
        }
    }

    /// Create a writer with the given memory budget (in bytes).
    pub fn writer(&self, memory_budget: usize) -> Result<IndexWriter> {
        Ok(self.index.writer(memory_budget)?)
    }

    /// Add a table record to the index via the given writer.
    ///
    /// Replaces any existing document with the same docno. The header and
    /// content fields are flattened from the record's relation.
    pub fn add_record(
        &self,
        writer: &IndexWriter,
        record: &TableRecord,
    ) -> Result<()> {
        let f = self.fields();

        let term = tantivy::Term::from_field_text(f.docno, &record.docno);
        writer.delete_term(term);

        let header = record.header().join(" ");
        let content = record
            .rows()
            .iter()
            .map(|row| row.join(" "))
            .collect::<Vec<_>>()
            .join(" ");

        writer.add_document(doc!(
            f.docno => record.docno.as_str(),
            f.page_title => record.page_title.as_str(),
            f.table_title => record.title.as_str(),
            f.header => header,
            f.content => content,
            f.text_before => record.text_before.as_str(),
            f.text_after => record.text_after.as_str(),
        ))?;

        Ok(())
    }

    /// Search the index with BM25 scoring over all six text fields.
    ///
    /// Returns the top `limit` hits in descending score order. Tie-breaking
    /// within equal scores is up to tantivy.
    pub fn search(
        &self,
        query_str: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let f = self.fields();
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let parser = QueryParser::for_index(
            &self.index,
            vec![
                f.page_title,
                f.table_title,
                f.header,
                f.content,
                f.text_before,
                f.text_after,
            ],
        );

        let (query, _errors) = parser.parse_query_lenient(query_str);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let docno = doc
                .get_first(f.docno)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            hits.push(SearchHit { docno, score });
        }

        Ok(hits)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex").finish_non_exhaustive()
    }
}
