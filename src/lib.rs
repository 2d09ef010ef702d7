//! Retrieval-augmented chat backend.
//!
//! A query is embedded, matched against the vector store, reduced to the
//! documents that clear the active provider's similarity threshold, merged
//! into an augmented prompt, and answered by a streaming completion
//! backend. Ingestion runs the same embedding path with a dedup gate on
//! the public corpus.

pub mod bots;
pub mod completion;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod history;
pub mod ingest;
pub mod intent;
pub mod logging;
pub mod retrieval;
pub mod server;
pub mod state;
pub mod vector;
