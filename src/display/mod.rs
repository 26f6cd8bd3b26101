//! What the operator sees.
//!
//! The scan loop publishes a [`DashboardSnapshot`] after every iteration on a
//! `tokio::sync::watch` channel. Front ends (the stdin console, the egui
//! dashboard) only read snapshots; they never touch the session.

use crate::{
    error::AppResult,
    instrument::{StreamId, Trace},
    scan::ScanState,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Latest view of one spectrum stream.
///
/// A failed read keeps the previous trace on screen and records the error
/// next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamView {
    /// Which stream this is.
    pub stream: StreamId,
    /// Last trace read successfully.
    pub trace: Option<Trace>,
    /// Error of the most recent read, cleared by the next good one.
    pub error: Option<String>,
}

impl StreamView {
    /// An empty view.
    pub fn new(stream: StreamId) -> Self {
        Self {
            stream,
            trace: None,
            error: None,
        }
    }

    /// Folds in the result of a read.
    pub fn update(&mut self, result: &AppResult<Trace>) {
        match result {
            Ok(trace) => {
                self.trace = Some(trace.clone());
                self.error = None;
            }
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    /// Plot title, e.g. `OSA1 (wavelength)`.
    pub fn title(&self) -> String {
        format!("{} ({})", self.stream.label(), self.stream.coordinate_name())
    }
}

/// State of the scan as of the last iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    /// Idle or scanning.
    pub state: ScanState,
    /// File id the next checkpoint will use.
    pub file_id: u64,
    /// Last committed piezo position.
    pub piezo_position: f64,
    /// Displacement since the last start.
    pub accumulated_displacement: f64,
    /// Last laser power reading, if it succeeded.
    pub laser_power: Option<f64>,
    /// Last laser wavelength reading, if it succeeded.
    pub laser_wavelength: Option<f64>,
    /// Loop iterations completed.
    pub iteration: u64,
    /// Checkpoints written successfully since startup.
    pub checkpoints_written: u64,
    /// When this snapshot was taken.
    pub updated_at: DateTime<Utc>,
    /// Per-stream plot data.
    #[serde(skip)]
    pub streams: Vec<StreamView>,
}

impl DashboardSnapshot {
    /// An idle snapshot with empty views for `streams`.
    pub fn new(streams: &[StreamId]) -> Self {
        Self {
            state: ScanState::Idle,
            file_id: 0,
            piezo_position: 0.0,
            accumulated_displacement: 0.0,
            laser_power: None,
            laser_wavelength: None,
            iteration: 0,
            checkpoints_written: 0,
            updated_at: Utc::now(),
            streams: streams.iter().copied().map(StreamView::new).collect(),
        }
    }

    /// View of `stream`, if the bench has it.
    pub fn stream(&self, stream: StreamId) -> Option<&StreamView> {
        self.streams.iter().find(|view| view.stream == stream)
    }

    pub(crate) fn stream_mut(&mut self, stream: StreamId) -> Option<&mut StreamView> {
        self.streams.iter_mut().find(|view| view.stream == stream)
    }

    /// The four indicator tiles: label and formatted value.
    pub fn metrics(&self) -> [(&'static str, String); 4] {
        [
            ("File ID", self.file_id.to_string()),
            ("Piezo Current", format!("{:.2}", self.piezo_position)),
            ("Laser Power", format_reading(self.laser_power)),
            ("Laser Wavelength", format_reading(self.laser_wavelength)),
        ]
    }

    /// One-line summary for the console.
    pub fn status_line(&self) -> String {
        let state = match self.state {
            ScanState::Idle => "idle",
            ScanState::Scanning => "scanning",
        };
        let metrics = self
            .metrics()
            .iter()
            .map(|(label, value)| format!("{label}: {value}"))
            .collect::<Vec<_>>()
            .join(" | ");
        format!("[{state}] {metrics}")
    }
}

fn format_reading(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}
