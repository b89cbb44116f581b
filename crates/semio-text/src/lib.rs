//! semio-text
//!
//! Lexical side of hybrid retrieval: tantivy analyzers turn query and chunk
//! text into terms, and `LexicalQuery` scores a chunk by term overlap.
pub mod lexical;

pub use lexical::{LexicalQuery, Lexicon, STOP_WORDS};
