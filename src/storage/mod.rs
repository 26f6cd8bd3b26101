//! Checkpoint persistence.
//!
//! A checkpoint is the set of traces captured at one piezo position. Each
//! stream lands in its own append-only CSV file named after the file id, the
//! position and the stream index (see [`checkpoint_file_name`]).

pub mod checkpoint;

pub use checkpoint::{checkpoint_file_name, Checkpoint, CheckpointSink, CsvCheckpointWriter};
