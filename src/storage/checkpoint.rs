//! CSV checkpoint writer.
//!
//! Rows are `row_index,coordinate,value` with no header. Files are opened in
//! append mode, so writing the same checkpoint twice doubles its rows rather
//! than replacing them.

use crate::{
    error::AppResult,
    instrument::{StreamId, Trace},
};
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Traces to persist under one file id.
#[derive(Debug, Clone)]
pub struct Checkpoint<'a> {
    /// Identifier shared by every file of this checkpoint.
    pub file_id: u64,
    /// Piezo position the traces were taken at.
    pub piezo_position: f64,
    /// Streams in file-index order.
    pub streams: Vec<(StreamId, &'a Trace)>,
}

/// `{file_id}_piezo_{position:.2}_{stream_index}.csv`
pub fn checkpoint_file_name(file_id: u64, piezo_position: f64, stream: StreamId) -> String {
    format!(
        "{}_piezo_{:.2}_{}.csv",
        file_id,
        piezo_position,
        stream.file_index()
    )
}

/// Destination for checkpoints.
#[async_trait]
pub trait CheckpointSink: Send {
    /// Persists every stream of `checkpoint` and returns the files written.
    async fn write(&mut self, checkpoint: &Checkpoint<'_>) -> AppResult<Vec<PathBuf>>;
}

/// Appends checkpoints as header-less CSV rows of `row_index,coordinate,value`.
///
/// Writing the same file id and position twice appends a second block of
/// rows to the same files.
#[derive(Debug, Clone)]
pub struct CsvCheckpointWriter {
    output_dir: PathBuf,
}

impl CsvCheckpointWriter {
    /// Binds the writer to `output_dir`, creating it when `create` is set.
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Io`](crate::error::DaqError::Io) when the
    /// directory cannot be created.
    pub fn open(output_dir: impl Into<PathBuf>, create: bool) -> AppResult<Self> {
        let output_dir = output_dir.into();
        if output_dir.is_dir() {
            info!("Folder already exists: {}", output_dir.display());
        } else if create {
            std::fs::create_dir_all(&output_dir)?;
            info!("Folder created: {}", output_dir.display());
        } else {
            warn!("Folder {} does not exist; checkpoints will fail", output_dir.display());
        }
        Ok(Self { output_dir })
    }

    /// Directory receiving the files.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn append_trace(&self, path: &Path, trace: &Trace) -> AppResult<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        for (row, (x, y)) in trace
            .coordinates()
            .iter()
            .zip(trace.values().iter())
            .enumerate()
        {
            writer.serialize((row, x, y))?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointSink for CsvCheckpointWriter {
    async fn write(&mut self, checkpoint: &Checkpoint<'_>) -> AppResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(checkpoint.streams.len());
        for (stream, trace) in &checkpoint.streams {
            let path = self.output_dir.join(checkpoint_file_name(
                checkpoint.file_id,
                checkpoint.piezo_position,
                *stream,
            ));
            self.append_trace(&path, trace)?;
            debug!("{} -> {} ({} rows)", stream, path.display(), trace.len());
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaqError;

    fn trace() -> Trace {
        Trace::new(vec![1590.0, 1590.5, 1591.0], vec![-80.0, -12.5, -79.0]).unwrap()
    }

    #[test]
    fn test_file_name_format() {
        assert_eq!(
            checkpoint_file_name(7, 0.5, StreamId::Osa1),
            "7_piezo_0.50_1.csv"
        );
        assert_eq!(
            checkpoint_file_name(12, 31.0, StreamId::Esa),
            "12_piezo_31.00_3.csv"
        );
    }

    #[test]
    fn test_open_creates_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("1003_24").join("temp5");
        let writer = CsvCheckpointWriter::open(&dir, true).unwrap();
        assert!(dir.is_dir());
        assert_eq!(writer.output_dir(), dir.as_path());
    }

    #[tokio::test]
    async fn test_rows_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvCheckpointWriter::open(dir.path(), true).unwrap();
        let osa = trace();
        let checkpoint = Checkpoint {
            file_id: 3,
            piezo_position: 1.0,
            streams: vec![(StreamId::Osa1, &osa), (StreamId::Osa2, &osa)],
        };

        let written = writer.write(&checkpoint).await.unwrap();
        assert_eq!(
            written,
            vec![
                dir.path().join("3_piezo_1.00_1.csv"),
                dir.path().join("3_piezo_1.00_2.csv"),
            ]
        );

        let contents = std::fs::read_to_string(&written[0]).unwrap();
        assert_eq!(
            contents,
            "0,1590.0,-80.0\n1,1590.5,-12.5\n2,1591.0,-79.0\n"
        );
    }

    #[tokio::test]
    async fn test_repeated_checkpoint_appends() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvCheckpointWriter::open(dir.path(), true).unwrap();
        let osa = trace();
        let checkpoint = Checkpoint {
            file_id: 0,
            piezo_position: 0.1,
            streams: vec![(StreamId::Osa1, &osa)],
        };

        writer.write(&checkpoint).await.unwrap();
        let written = writer.write(&checkpoint).await.unwrap();
        let contents = std::fs::read_to_string(&written[0]).unwrap();
        assert_eq!(contents.lines().count(), 6);
    }

    #[tokio::test]
    async fn test_missing_directory_is_io_error() {
        let root = tempfile::tempdir().unwrap();
        let mut writer = CsvCheckpointWriter::open(root.path().join("absent"), false).unwrap();
        let osa = trace();
        let checkpoint = Checkpoint {
            file_id: 0,
            piezo_position: 0.0,
            streams: vec![(StreamId::Osa1, &osa)],
        };

        let err = writer.write(&checkpoint).await.unwrap_err();
        assert!(matches!(err, DaqError::Io(_)));
        assert!(err.is_recoverable());
    }
}
