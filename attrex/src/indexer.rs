//! Tantivy dictionary index
//!
//! Search runs in three steps: boolean/fuzzy recall over the composed clauses,
//! verification of every operand against the candidate's own stored text, then
//! rescoring each candidate from the BM25 contribution of its verified terms.

use crate::backend::{Hit, SearchBackend, SearchSession};
use crate::config::IndexConfig;
use crate::query::{Clause, Combinator, ComposedQuery, QueryField, QueryTerm, TermMatch};
use crate::source::{self, DictionaryEntry, DictionarySource, SourceError};
use crate::text;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED, STRING,
};
use tantivy::{
    DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument,
    TantivyError, Term,
};
use thiserror::Error;

/// Candidates recalled per requested hit, before verification drops some.
const RECALL_FACTOR: usize = 4;

/// Error type for indexer operations
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
    #[error("Directory error: {0}")]
    Directory(#[from] tantivy::directory::error::OpenDirectoryError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Dictionary source error: {0}")]
    Source(#[from] SourceError),
}

pub type IndexerResult<T> = Result<T, IndexerError>;

#[derive(Debug, Clone, Copy)]
struct DictionaryFields {
    text_value: Field,
    word_bigrams: Field,
    specific_text: Field,
    attribute_code: Field,
    node_id: Field,
}

impl DictionaryFields {
    fn field(&self, field: QueryField) -> Field {
        match field {
            QueryField::TextValue => self.text_value,
            QueryField::WordBigrams => self.word_bigrams,
            QueryField::SpecificText => self.specific_text,
        }
    }
}

/// Read-only dictionary index. Built once, then shared by extraction calls.
pub struct DictionaryIndex {
    index: Index,
    reader: IndexReader,
    fields: DictionaryFields,
}

impl DictionaryIndex {
    /// Build a RAM index from `entries`.
    pub fn in_memory(entries: Vec<DictionaryEntry>, config: &IndexConfig) -> IndexerResult<Self> {
        let (schema, fields) = Self::build_schema();
        let index = Index::create_in_ram(schema);
        let dictionary = Self::from_parts(index, fields)?;
        let entries: Vec<DictionaryEntry> = entries
            .into_iter()
            .filter_map(DictionaryEntry::normalized)
            .collect();
        dictionary.build(&entries, config)?;
        Ok(dictionary)
    }

    /// Open the index stored at `path`, building it from `source` when it holds no documents.
    pub fn open_or_build(
        path: &Path,
        source: &DictionarySource,
        config: &IndexConfig,
    ) -> IndexerResult<Self> {
        std::fs::create_dir_all(path)?;
        let dir = MmapDirectory::open(path)?;
        let (schema, fields) = Self::build_schema();
        let index = Index::open_or_create(dir, schema)?;
        let dictionary = Self::from_parts(index, fields)?;

        if dictionary.num_docs() == 0 {
            let entries = source.load()?;
            tracing::info!(path = %path.display(), entries = entries.len(), "building dictionary index");
            dictionary.build(&entries, config)?;
        } else {
            tracing::debug!(path = %path.display(), docs = dictionary.num_docs(), "opened dictionary index");
        }
        Ok(dictionary)
    }

    fn from_parts(index: Index, fields: DictionaryFields) -> IndexerResult<Self> {
        index
            .tokenizers()
            .register(text::DICTIONARY_TOKENIZER, text::build_analyzer());
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(Self { index, reader, fields })
    }

    fn build_schema() -> (Schema, DictionaryFields) {
        let mut builder = Schema::builder();

        let text_indexing = TextFieldIndexing::default()
            .set_tokenizer(text::DICTIONARY_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let text_value = builder.add_text_field(
            "text_value",
            TextOptions::default()
                .set_indexing_options(text_indexing)
                .set_stored(),
        );

        // One raw value per adjacent word pair
        let bigram_indexing = TextFieldIndexing::default()
            .set_tokenizer("raw")
            .set_index_option(IndexRecordOption::WithFreqs);
        let word_bigrams = builder.add_text_field(
            "word_bigrams",
            TextOptions::default().set_indexing_options(bigram_indexing),
        );

        // Populated only for entries outside the dominant category
        let specific_indexing = TextFieldIndexing::default()
            .set_tokenizer(text::DICTIONARY_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqs);
        let specific_text = builder.add_text_field(
            "specific_text",
            TextOptions::default()
                .set_indexing_options(specific_indexing)
                .set_stored(),
        );

        let attribute_code = builder.add_text_field("attribute_code", STRING | STORED);
        let node_id = builder.add_text_field("node_id", STRING | STORED);

        let fields = DictionaryFields {
            text_value,
            word_bigrams,
            specific_text,
            attribute_code,
            node_id,
        };
        (builder.build(), fields)
    }

    fn build(&self, entries: &[DictionaryEntry], config: &IndexConfig) -> IndexerResult<()> {
        let dominant = config
            .dominant_category
            .clone()
            .or_else(|| source::dominant_category(entries));

        let mut writer: IndexWriter = self.index.writer(config.writer_heap_bytes)?;
        for entry in entries {
            writer.add_document(self.document(entry, dominant.as_deref()))?;
        }
        writer.commit()?;
        self.reader.reload()?;

        tracing::debug!(
            docs = self.num_docs(),
            dominant = dominant.as_deref().unwrap_or("-"),
            "dictionary index committed"
        );
        Ok(())
    }

    fn document(&self, entry: &DictionaryEntry, dominant: Option<&str>) -> TantivyDocument {
        let f = &self.fields;
        let mut doc = TantivyDocument::default();
        doc.add_text(f.text_value, &entry.text_value);
        for key in entry.bigrams() {
            doc.add_text(f.word_bigrams, &key);
        }
        if dominant != Some(entry.attribute_code.as_str()) {
            doc.add_text(f.specific_text, &entry.text_value);
        }
        doc.add_text(f.attribute_code, &entry.attribute_code);
        if let Some(node_id) = &entry.node_id {
            doc.add_text(f.node_id, node_id);
        }
        doc
    }

    /// Get the number of documents in the index
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn term_query(&self, term: &QueryTerm) -> Box<dyn Query> {
        let t = Term::from_field_text(self.fields.field(term.field), &term.text);
        match term.matching {
            TermMatch::Exact => Box::new(TermQuery::new(t, IndexRecordOption::WithFreqs)),
            TermMatch::Fuzzy { distance, .. } => Box::new(FuzzyTermQuery::new(
                t,
                distance.min(text::MAX_AUTOMATON_DISTANCE),
                true,
            )),
        }
    }

    fn clause_query(&self, clause: &Clause) -> Box<dyn Query> {
        let occur = match clause.combinator {
            Combinator::All => Occur::Must,
            Combinator::Any { .. } => Occur::Should,
        };
        let operands = clause
            .terms
            .iter()
            .map(|term| (occur, self.term_query(term)))
            .collect();
        Box::new(BoostQuery::new(Box::new(BooleanQuery::new(operands)), clause.boost))
    }

    /// Recall query: every clause is an optional, boosted sub-query.
    fn recall_query(&self, query: &ComposedQuery) -> BooleanQuery {
        BooleanQuery::new(
            query
                .clauses()
                .iter()
                .map(|clause| (Occur::Should, self.clause_query(clause)))
                .collect(),
        )
    }
}

impl SearchBackend for DictionaryIndex {
    type Session<'a> = DictionarySession<'a>;

    fn session(&self) -> IndexerResult<DictionarySession<'_>> {
        Ok(DictionarySession {
            index: self,
            searcher: self.reader.searcher(),
        })
    }
}

/// Searcher leased from the index reader; returned to the pool on drop.
pub struct DictionarySession<'a> {
    index: &'a DictionaryIndex,
    searcher: Searcher,
}

/// Stored fields and derived tokens of one recalled document.
struct CandidateDoc {
    address: DocAddress,
    text: String,
    attribute_code: String,
    node_id: Option<String>,
    tokens: Vec<String>,
    bigrams: Vec<String>,
    specific: bool,
}

impl CandidateDoc {
    /// Document-side values a query term can be verified against.
    fn values(&self, field: QueryField) -> &[String] {
        match field {
            QueryField::TextValue => &self.tokens,
            QueryField::WordBigrams => &self.bigrams,
            QueryField::SpecificText if self.specific => &self.tokens,
            QueryField::SpecificText => &[],
        }
    }

    fn verify<'d>(&'d self, term: &QueryTerm) -> Vec<&'d str> {
        let mut matched: Vec<&str> = Vec::new();
        for value in self.values(term.field) {
            let ok = match term.matching {
                TermMatch::Exact => *value == term.text,
                TermMatch::Fuzzy { distance, prefix_len } => {
                    text::fuzzy_match(&term.text, value, distance, prefix_len)
                }
            };
            if ok && !matched.contains(&value.as_str()) {
                matched.push(value);
            }
        }
        matched
    }
}

impl DictionarySession<'_> {
    fn load(&self, address: DocAddress) -> IndexerResult<CandidateDoc> {
        let f = &self.index.fields;
        let doc: TantivyDocument = self.searcher.doc(address)?;
        let stored = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        let text = stored(f.text_value).unwrap_or_default();
        let tokens = text::tokenize(&text);
        let bigrams = text::bigram_keys(&tokens);
        Ok(CandidateDoc {
            address,
            attribute_code: stored(f.attribute_code).unwrap_or_default(),
            node_id: stored(f.node_id),
            specific: doc.get_first(f.specific_text).is_some(),
            text,
            tokens,
            bigrams,
        })
    }

    /// BM25 of a single document term, as tantivy explains it.
    fn term_score(&self, field: QueryField, value: &str, address: DocAddress) -> IndexerResult<f32> {
        let term = Term::from_field_text(self.index.fields.field(field), value);
        let query = TermQuery::new(term, IndexRecordOption::WithFreqs);
        match query.explain(&self.searcher, address) {
            Ok(explanation) => Ok(explanation.value()),
            // Document does not hold the term
            Err(TantivyError::InvalidArgument(_)) => Ok(0.0),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify and rescore one recalled document. `None` when no operand holds.
    fn score(&self, query: &ComposedQuery, candidate: CandidateDoc) -> IndexerResult<Option<Hit>> {
        let mut score = 0.0f32;
        let mut matched_terms: Vec<String> = Vec::new();

        for clause in query.clauses() {
            let mut clause_sum = 0.0f32;
            let mut hits = 0usize;
            let mut clause_terms: Vec<&str> = Vec::new();

            for term in &clause.terms {
                let values = candidate.verify(term);
                if values.is_empty() {
                    continue;
                }
                hits += 1;
                let mut best = 0.0f32;
                for value in &values {
                    best = best.max(self.term_score(term.field, value, candidate.address)?);
                }
                clause_sum += best;
                clause_terms.extend(values);
            }

            let factor = clause.combinator.factor(hits, clause.terms.len());
            if factor == 0.0 {
                continue;
            }
            score += clause.boost * clause_sum * factor;
            for value in clause_terms {
                if !matched_terms.iter().any(|t| t == value) {
                    matched_terms.push(value.to_string());
                }
            }
        }

        if matched_terms.is_empty() {
            return Ok(None);
        }
        Ok(Some(Hit {
            text: candidate.text,
            attribute_code: candidate.attribute_code,
            node_id: candidate.node_id,
            score,
            matched_terms,
        }))
    }
}

impl SearchSession for DictionarySession<'_> {
    fn search(&self, query: &ComposedQuery, limit: usize) -> IndexerResult<Vec<Hit>> {
        if limit == 0 || query.clauses().is_empty() {
            return Ok(Vec::new());
        }
        tracing::trace!(%query, limit, "dictionary search");
        #[cfg(feature = "perf-log")]
        let t0 = std::time::Instant::now();

        let recall = self.index.recall_query(query);
        // Never ask for more documents than the index holds
        let recall_limit = limit
            .saturating_mul(RECALL_FACTOR)
            .min(self.searcher.num_docs() as usize)
            .max(1);
        let top_docs = self
            .searcher
            .search(&recall, &TopDocs::with_limit(recall_limit).order_by_score())?;
        #[cfg(feature = "perf-log")]
        let t1 = std::time::Instant::now();
        #[cfg(feature = "perf-log")]
        let recalled = top_docs.len();

        let mut hits = Vec::with_capacity(top_docs.len());
        for (_, address) in top_docs {
            let candidate = self.load(address)?;
            if let Some(hit) = self.score(query, candidate)? {
                hits.push(hit);
            }
        }

        // Stable: equal scores keep recall order
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);

        #[cfg(feature = "perf-log")]
        tracing::info!(
            recall_ms = (t1 - t0).as_secs_f64() * 1000.0,
            verify_ms = t1.elapsed().as_secs_f64() * 1000.0,
            recalled,
            verified = hits.len(),
            "[perf] dictionary search"
        );
        Ok(hits)
    }

    fn doc_frequency(&self, field: QueryField, term: &str) -> IndexerResult<u64> {
        let term = Term::from_field_text(self.index.fields.field(field), term);
        Ok(self.searcher.doc_freq(&term)?)
    }

    fn doc_count(&self) -> u64 {
        self.searcher.num_docs()
    }
}
