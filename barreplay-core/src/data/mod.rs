//! Record sources and the per-symbol integrity pipeline

pub mod csv_source;
pub mod file;
pub mod json;
pub mod loader;
pub mod parquet;
pub mod sample;
pub mod source;

pub use csv_source::CsvSource;
pub use file::FileSource;
pub use json::JsonSource;
pub use loader::{BarFields, LoadError, SymbolLoader, SymbolSession};
pub use parquet::ParquetSource;
pub use source::{BarSource, MemorySource, RawRecord, RawTimestamp, SourceError};
