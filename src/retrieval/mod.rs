// Retrieval clients: lexical (BM25) and dense (vector) backends behind
// one trait so the orchestrator and tests can swap implementations.

pub mod backend;
pub mod lexical;
pub mod vector;

pub use backend::SearchBackend;
pub use lexical::LexicalIndexClient;
pub use vector::VectorIndexClient;
