//! Posting catalog extraction.
//!
//! The catalog is the account's manage-postings table. Extraction is best
//! effort: individual rows that cannot be read are dropped with a warning,
//! and only a page that does not look like the table at all is fatal.

mod parser;
mod types;

pub use parser::CatalogParser;
pub use types::*;
