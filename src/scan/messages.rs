//! Commands accepted by the scan controller task.
//!
//! Front ends never share the session with the loop. They send a
//! [`ScanCommand`] and, when they care, await the oneshot reply.

use crate::display::DashboardSnapshot;
use tokio::sync::oneshot;

/// Commands that can be sent to the [`ScanController`](super::ScanController)
#[derive(Debug)]
pub enum ScanCommand {
    /// Begin (or restart) a scan
    Start {
        /// File id of the first checkpoint
        file_id_start: u64,
        /// Piezo position the scan starts from
        piezo_start: f64,
        /// Acknowledged once the session is reset
        response: oneshot::Sender<()>,
    },

    /// Stop advancing the piezo; position and file id are kept
    Stop {
        /// Acknowledged once the session is idle
        response: oneshot::Sender<()>,
    },

    /// Get the latest snapshot
    Status {
        /// Receives a copy of the snapshot
        response: oneshot::Sender<DashboardSnapshot>,
    },

    /// Leave the loop
    Shutdown {
        /// Acknowledged just before the loop exits
        response: oneshot::Sender<()>,
    },
}

impl ScanCommand {
    /// Helper to create a Start command
    pub fn start(file_id_start: u64, piezo_start: f64) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Start {
                file_id_start,
                piezo_start,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a Stop command
    pub fn stop() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Stop { response: tx }, rx)
    }

    /// Helper to create a Status command
    pub fn status() -> (Self, oneshot::Receiver<DashboardSnapshot>) {
        let (tx, rx) = oneshot::channel();
        (Self::Status { response: tx }, rx)
    }

    /// Helper to create a Shutdown command
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { response: tx }, rx)
    }
}
