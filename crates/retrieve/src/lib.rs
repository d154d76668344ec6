//! External-index BM25 retrieval and dense reranking for a fixed,
//! million-passage text corpus.
//!
//! The pipeline has two stages. **Build** streams a preprocessed
//! `collection.tsv` through the [`token`] tokeniser, spills sorted
//! `(term, docid, tf)` runs to disk ([`build`]), and k-way merges them
//! into a compact `postings.bin` + `lexicon.tsv` + `doclen.bin` triple
//! ([`merge`]). **Query** decodes postings for a free-text query
//! ([`postings`]), scores candidates with BM25 ([`bm25`]), and emits a
//! TREC run ([`query`], [`runio`]). Optionally, a reranking pass
//! ([`rerank`]) re-scores the BM25 candidates by dense dot-product
//! similarity against aligned query/passage [`embed`] tables and fuses
//! the two signals.
//!
//! The index is built once and opened read-only; there is no update path,
//! no distributed sharding, and no query rewriting beyond [`token`]'s
//! fixed tokenisation rules.
//!
//! # Example: build, search, rerank
//!
//! ```rust,no_run
//! use passage_retrieve::build::{build_index, BuildConfig};
//! use passage_retrieve::merge::merge_runs;
//! use passage_retrieve::postings::{read_doclen, read_lexicon, PostingsFile};
//! use passage_retrieve::bm25::{Bm25Index, Bm25Params, ScoreMode};
//! use passage_retrieve::query::{search_to_run, QueryDriverConfig};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), passage_retrieve::RetrieveError> {
//! build_index(&BuildConfig {
//!     input: PathBuf::from("collection.tsv"),
//!     outdir: PathBuf::from("runs"),
//!     batch_docs: 100_000,
//!     max_docs: None,
//! })?;
//! merge_runs(&PathBuf::from("runs"), &PathBuf::from("index"))?;
//!
//! let lexicon = read_lexicon(&PathBuf::from("index/lexicon.tsv"))?;
//! let doclen = read_doclen(&PathBuf::from("index/doclen.bin"))?;
//! let postings = PostingsFile::open(&PathBuf::from("index/postings.bin"))?;
//! let index = Bm25Index::new(&lexicon, &doclen, &postings);
//!
//! search_to_run(
//!     &index,
//!     &PathBuf::from("queries.tsv"),
//!     &PathBuf::from("run.bm25.trec"),
//!     &QueryDriverConfig { mode: ScoreMode::Disjunctive, params: Bm25Params::default(), topk: 1000 },
//!     None,
//! )?;
//! # Ok(())
//! # }
//! ```

/// Deterministic, streaming tokenisation: `text -> lowercase alphanumeric
/// token stream`. Used at both index-build and query time.
pub mod token;

/// Stream the collection, tokenise, and spill sorted `(term, docid, tf)`
/// runs plus the `doclen.bin` sidecar.
pub mod build;

/// K-way merge sorted runs into `postings.bin` + `lexicon.tsv`.
pub mod merge;

/// Decode a term's postings from the final postings file.
pub mod postings;

/// IDF, per-posting score, disjunctive/conjunctive aggregation, and
/// top-K selection.
pub mod bm25;

/// Parse a query file, invoke the scorer, and emit a TREC run.
pub mod query;

/// A columnar id/vector table for dense reranking.
pub mod embed;

/// Dot-product dense scoring over BM25 candidates, with normalisation and
/// fusion.
pub mod rerank;

/// Lenient TREC run reader, strict writer.
pub mod runio;

/// Error types shared across every stage.
pub mod error;

/// Crash-safe file persistence used by [`build`] and [`merge`].
pub mod persistence;

/// Documented contract for the excluded nearest-neighbour collaborator
/// (the HNSW index builder/searcher, treated as an opaque external
/// service by this crate).
pub mod integration;

/// Dot product with SIMD dispatch, used by [`rerank`] for dense scoring.
pub mod simd;

pub use error::RetrieveError;
