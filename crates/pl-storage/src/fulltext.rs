use std::path::Path;
use std::time::{Duration, Instant};

use pl_core::{Chunk, ChunkId};
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer,
    TokenStream,
};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::error::StorageError;

const PAPER_TOKENIZER: &str = "paper";
const CONTENT_MAX_BYTES: usize = 32_768;
const MAX_TOKEN_LEN: usize = 40;
const BATCH_COUNT_THRESHOLD: usize = 500;
const BATCH_TIME_THRESHOLD: Duration = Duration::from_millis(500);

/// English stop words removed at both index and query time.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// A single BM25 search hit.
#[derive(Debug, Clone)]
pub struct FullTextHit {
    pub chunk_id: ChunkId,
    /// Raw BM25 score; higher is better.
    pub score: f32,
}

/// Secondary fields indexed next to the chunk text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexicalFields {
    pub paper_title: String,
    pub authors: String,
}

impl From<&Chunk> for LexicalFields {
    fn from(chunk: &Chunk) -> Self {
        Self {
            paper_title: chunk.paper_title.clone(),
            authors: chunk.authors.clone(),
        }
    }
}

/// Full-text search index backed by Tantivy.
///
/// Every text field goes through the `paper` analyzer: simple tokenization,
/// long-token removal, lowercasing, English stop words and Porter stemming.
/// Only the chunk id is stored; the text lives in the document store.
///
/// Batched commit strategy: commits on 500 documents or 500ms elapsed,
/// whichever comes first. Forced commit on drop.
pub struct FullTextStore {
    index: Index,
    reader: IndexReader,
    /// `None` when opened read-only.
    writer: Option<IndexWriter>,
    f_chunk_id: Field,
    f_content: Field,
    f_paper_title: Field,
    f_authors: Field,
    pending_count: usize,
    last_commit: Instant,
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    builder.add_u64_field("chunk_id", INDEXED | STORED | FAST);

    let paper_text = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(PAPER_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );

    builder.add_text_field("content", paper_text.clone());
    builder.add_text_field("paper_title", paper_text.clone());
    builder.add_text_field("authors", paper_text);

    builder.build()
}

fn paper_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(
            STOP_WORDS.iter().map(|w| w.to_string()),
        ))
        .filter(Stemmer::new(Language::English))
        .build()
}

fn register_paper_tokenizer(index: &Index) {
    index.tokenizers().register(PAPER_TOKENIZER, paper_analyzer());
}

fn field(schema: &Schema, name: &str) -> Result<Field, StorageError> {
    schema
        .get_field(name)
        .map_err(|_| StorageError::FullTextIndexUnavailable {
            reason: format!("index schema has no `{name}` field"),
        })
}

impl FullTextStore {
    /// Open or create a full-text index at the given directory path.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(path)?;

        let index = Index::open_in_dir(path)
            .or_else(|_| Index::create_in_dir(path, build_schema()))?;
        register_paper_tokenizer(&index);

        let writer = index.writer(50_000_000).map_err(|e| {
            if matches!(e, tantivy::TantivyError::LockFailure(..)) {
                StorageError::Locked {
                    reason: e.to_string(),
                }
            } else {
                StorageError::Tantivy(e)
            }
        })?;
        Self::from_index(index, Some(writer))
    }

    /// Open an existing index for searching only.
    ///
    /// The reader is a point-in-time view: commits made afterwards by another
    /// writer are not picked up. A directory with no index yields an empty
    /// in-memory index.
    pub fn open_read_only(path: &Path) -> Result<Self, StorageError> {
        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path)?
        } else {
            Index::create_in_ram(build_schema())
        };
        register_paper_tokenizer(&index);
        Self::from_index(index, None)
    }

    /// Create an in-memory full-text index (for testing).
    pub fn create_in_ram() -> Result<Self, StorageError> {
        let index = Index::create_in_ram(build_schema());
        register_paper_tokenizer(&index);

        let writer = index.writer(15_000_000)?;
        Self::from_index(index, Some(writer))
    }

    fn from_index(index: Index, writer: Option<IndexWriter>) -> Result<Self, StorageError> {
        let schema = index.schema();
        let f_chunk_id = field(&schema, "chunk_id")?;
        let f_content = field(&schema, "content")?;
        let f_paper_title = field(&schema, "paper_title")?;
        let f_authors = field(&schema, "authors")?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            writer,
            f_chunk_id,
            f_content,
            f_paper_title,
            f_authors,
            pending_count: 0,
            last_commit: Instant::now(),
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.writer.is_none()
    }

    /// Number of committed documents visible to searches.
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Delete all documents from the index.
    ///
    /// Commits immediately and refreshes the reader.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        let writer = self.writer_mut()?;
        writer.delete_all_documents()?;
        writer.commit()?;
        self.reader.reload()?;
        self.pending_count = 0;
        self.last_commit = Instant::now();
        Ok(())
    }

    /// Index one text per id, with its title and authors. Existing ids are
    /// replaced.
    pub fn add(
        &mut self,
        ids: &[ChunkId],
        texts: &[&str],
        extra: &[LexicalFields],
    ) -> Result<(), StorageError> {
        if ids.len() != texts.len() || ids.len() != extra.len() {
            return Err(StorageError::InvalidArgument {
                reason: format!(
                    "{} ids, {} texts and {} field sets",
                    ids.len(),
                    texts.len(),
                    extra.len()
                ),
            });
        }
        for ((id, text), fields) in ids.iter().zip(texts).zip(extra) {
            self.add_document(*id, text, fields)?;
        }
        Ok(())
    }

    /// Index a chunk's text, title and authors.
    pub fn add_chunk(&mut self, chunk: &Chunk) -> Result<(), StorageError> {
        self.add_document(chunk.chunk_id, &chunk.text, &LexicalFields::from(chunk))
    }

    fn add_document(
        &mut self,
        chunk_id: ChunkId,
        text: &str,
        fields: &LexicalFields,
    ) -> Result<(), StorageError> {
        let content = pl_core::truncate_utf8_bytes(text, CONTENT_MAX_BYTES);
        let f_chunk_id = self.f_chunk_id;
        let document = doc!(
            self.f_chunk_id => chunk_id.0,
            self.f_content => content,
            self.f_paper_title => fields.paper_title.as_str(),
            self.f_authors => fields.authors.as_str(),
        );

        let writer = self.writer_mut()?;
        writer.delete_term(Term::from_field_u64(f_chunk_id, chunk_id.0));
        writer.add_document(document)?;

        self.pending_count += 1;
        self.maybe_commit()?;
        Ok(())
    }

    /// Delete the document for the given chunk.
    pub fn delete(&mut self, chunk_id: ChunkId) -> Result<(), StorageError> {
        let f_chunk_id = self.f_chunk_id;
        self.writer_mut()?
            .delete_term(Term::from_field_u64(f_chunk_id, chunk_id.0));
        self.pending_count += 1;
        self.maybe_commit()?;
        Ok(())
    }

    /// Search chunks using BM25 ranking.
    ///
    /// The query is matched against content, title and authors. Syntax errors
    /// are tolerated; phrase (`"..."`) and boolean operators are honored. A
    /// query with no indexable terms (empty, punctuation, only stop words)
    /// returns no hits.
    #[tracing::instrument(skip(self), fields(result_count))]
    pub fn search_bm25(&self, query: &str, k: usize) -> Result<Vec<FullTextHit>, StorageError> {
        if k == 0 {
            return Err(StorageError::InvalidArgument {
                reason: "k must be at least 1".to_string(),
            });
        }
        if !self.has_indexable_terms(query)? {
            tracing::Span::current().record("result_count", 0);
            return Ok(Vec::new());
        }

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![self.f_content, self.f_paper_title, self.f_authors],
        );
        let (text_query, _errors) = query_parser.parse_query_lenient(query);

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&text_query, &TopDocs::with_limit(k))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved: TantivyDocument = searcher.doc(doc_address)?;
            if let Some(OwnedValue::U64(raw)) = retrieved.get_first(self.f_chunk_id) {
                hits.push(FullTextHit {
                    chunk_id: ChunkId(*raw),
                    score,
                });
            }
        }
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });

        tracing::Span::current().record("result_count", hits.len());
        Ok(hits)
    }

    /// Run `text` through the index analyzer and report whether any token survives.
    fn has_indexable_terms(&self, text: &str) -> Result<bool, StorageError> {
        let mut analyzer = self.index.tokenizer_for_field(self.f_content)?;
        let mut stream = analyzer.token_stream(text);
        Ok(stream.advance())
    }

    /// Force a commit of all pending documents and refresh the reader.
    pub fn commit(&mut self) -> Result<(), StorageError> {
        if self.pending_count > 0 {
            self.writer_mut()?.commit()?;
            self.reader.reload()?;
            self.pending_count = 0;
            self.last_commit = Instant::now();
        }
        Ok(())
    }

    /// Number of documents pending commit.
    pub fn pending_count(&self) -> usize {
        self.pending_count
    }

    fn maybe_commit(&mut self) -> Result<(), StorageError> {
        if self.pending_count >= BATCH_COUNT_THRESHOLD
            || self.last_commit.elapsed() >= BATCH_TIME_THRESHOLD
        {
            self.commit()?;
        }
        Ok(())
    }

    fn writer_mut(&mut self) -> Result<&mut IndexWriter, StorageError> {
        self.writer
            .as_mut()
            .ok_or(StorageError::ReadOnly { store: "full-text" })
    }
}

impl Drop for FullTextStore {
    fn drop(&mut self) {
        if self.writer.is_some() {
            let _ = self.commit();
        }
    }
}
