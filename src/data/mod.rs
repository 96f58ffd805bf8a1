//! Data ingestion and the in-memory dataset used by the pipeline

mod dataset;
mod loader;

pub use dataset::{coerce_numeric, frame_to_records, Dataset};
pub use loader::{read_csv, read_csv_file};
