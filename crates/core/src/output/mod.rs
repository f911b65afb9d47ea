//! Hand-off of run results to the host's storage.
//!
//! Blobs (summary, artifacts, checkpoint) go to a `KeyValueStore`; one
//! tabular row per attempted listing goes to a `DatasetSink`.

mod dataset;
mod error;
mod kv;

pub use dataset::{DatasetRow, DatasetSink, SqliteDataset};
pub use error::StoreError;
pub use kv::{FsKeyValueStore, KeyValueStore, StoredValue};
