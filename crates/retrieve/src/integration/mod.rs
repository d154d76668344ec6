//! Trait interface for an external nearest-neighbour collaborator.
//!
//! This crate treats an HNSW-style index builder/searcher as an opaque
//! external service: this module documents its input/output contract as a
//! trait without providing an implementation. The dense re-ranking path in
//! [`crate::rerank`] does brute-force dot products over a bounded BM25
//! candidate set and never needs this trait itself; it exists for callers
//! who swap in an ANN backend ahead of the BM25 stage.
//!
//! # Usage
//!
//! Implement the `Backend` trait for your chosen nearest-neighbour service:
//!
//! ```rust,no_run
//! use passage_retrieve::integration::Backend;
//! use passage_retrieve::RetrieveError;
//!
//! struct MyBackend {
//!     // Your backend implementation
//! }
//!
//! impl Backend for MyBackend {
//!     fn retrieve(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, RetrieveError> {
//!         // Your implementation
//!         Ok(vec![])
//!     }
//!
//!     fn add_document(&mut self, doc_id: u32, embedding: &[f32]) -> Result<(), RetrieveError> {
//!         // Your implementation
//!         Ok(())
//!     }
//!
//!     fn build(&mut self) -> Result<(), RetrieveError> {
//!         // Your implementation
//!         Ok(())
//!     }
//! }
//! ```

/// Trait for an external nearest-neighbour backend (HNSW, FAISS, Qdrant,
/// Pinecone, ...) that can sit in front of, or alongside, BM25 retrieval.
///
/// This crate defines the contract only; it does not ship an
/// implementation — the nearest-neighbour backend is treated as an
/// opaque external collaborator.
pub trait Backend {
    /// Retrieve top-k documents for a query.
    ///
    /// Returns vector of (document_id, score) pairs sorted by score descending.
    fn retrieve(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, crate::RetrieveError>;

    /// Add a document to the index.
    fn add_document(&mut self, doc_id: u32, embedding: &[f32]) -> Result<(), crate::RetrieveError>;

    /// Build/finalize the index (required for some backends before retrieval).
    fn build(&mut self) -> Result<(), crate::RetrieveError>;
}
