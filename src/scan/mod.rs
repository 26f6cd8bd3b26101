//! The piezo scan: session state, the checkpoint trigger and the loop that
//! drives both.
//!
//! ```text
//!            Start{file_id, piezo}
//!   Idle ────────────────────────────► Scanning
//!    ▲                                    │
//!    └──────────────── Stop ──────────────┘
//! ```
//!
//! While scanning, every iteration advances the piezo by `step_background`.
//! When the accumulated displacement lands (within half a background step)
//! on a multiple of `step_record`, the traces of that iteration are written
//! under the current file id and the id is incremented. A failed reading
//! skips only that iteration's checkpoint; the piezo still advances.

pub mod controller;
pub mod messages;
pub mod sample;
pub mod session;
pub mod trigger;

pub use controller::{CheckpointOutcome, IterationReport, ScanController, ScanHandle, StepOutcome};
pub use messages::ScanCommand;
pub use sample::SampleBundle;
pub use session::{PlannedStep, RecordingPolicy, ScanSession, ScanState};
pub use trigger::is_near_multiple;
