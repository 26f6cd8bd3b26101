//! The scan loop.
//!
//! [`ScanController`] owns the session, the instruments and the checkpoint
//! sink. One iteration polls every instrument, advances the piezo while
//! scanning, writes a checkpoint when the trigger fires and every reading
//! succeeded, then publishes a [`DashboardSnapshot`].
//! Between iterations the loop waits `poll_interval` while draining operator
//! commands, so a command never lands in the middle of a checkpoint.

use super::{
    messages::ScanCommand,
    sample::SampleBundle,
    session::{RecordingPolicy, ScanSession, ScanState},
};
use crate::{
    config::AppConfig,
    display::DashboardSnapshot,
    error::{AppResult, DaqError},
    instrument::{InstrumentSuite, StreamId, Trace},
    storage::{Checkpoint, CheckpointSink, CsvCheckpointWriter},
};
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Commands buffered between the front ends and the loop.
const COMMAND_CAPACITY: usize = 32;

/// Result of a fired checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointOutcome {
    /// Every stream was appended.
    Written {
        /// Id the files were tagged with.
        file_id: u64,
        /// Files appended to.
        files: Vec<PathBuf>,
    },
    /// The sink failed; the id is consumed anyway.
    Failed {
        /// Id that was consumed.
        file_id: u64,
        /// Sink error.
        error: String,
    },
    /// A reading of this iteration failed. Nothing was written and no id
    /// was used.
    Aborted {
        /// Readings that failed.
        failed: Vec<&'static str>,
    },
}

/// What the piezo did in one iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Not scanning.
    Idle,
    /// Scanning, but the laser rejected the piezo command; the step was not
    /// committed.
    Held {
        /// Laser error.
        error: String,
    },
    /// The piezo moved to `position`.
    Advanced {
        /// New committed position.
        position: f64,
        /// Set when the trigger fired.
        checkpoint: Option<CheckpointOutcome>,
    },
}

/// Summary of one loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    /// 1-based iteration counter.
    pub iteration: u64,
    /// Session state after the iteration.
    pub state: ScanState,
    /// Piezo outcome.
    pub step: StepOutcome,
}

impl IterationReport {
    /// The checkpoint written, attempted or aborted in this iteration, if
    /// the trigger fired.
    pub fn checkpoint(&self) -> Option<&CheckpointOutcome> {
        match &self.step {
            StepOutcome::Advanced { checkpoint, .. } => checkpoint.as_ref(),
            _ => None,
        }
    }
}

/// Owns the scan session and drives the acquisition loop.
pub struct ScanController {
    suite: InstrumentSuite,
    sink: Box<dyn CheckpointSink>,
    policy: RecordingPolicy,
    poll_interval: Duration,
    session: ScanSession,
    iteration: u64,
    checkpoints_written: u64,
    snapshot_tx: watch::Sender<DashboardSnapshot>,
}

impl ScanController {
    /// Assembles a controller from already-built parts. The session starts
    /// idle.
    pub fn new(
        suite: InstrumentSuite,
        sink: Box<dyn CheckpointSink>,
        policy: RecordingPolicy,
        poll_interval: Duration,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(DashboardSnapshot::new(&suite.streams()));
        Self {
            suite,
            sink,
            policy,
            poll_interval,
            session: ScanSession::new(),
            iteration: 0,
            checkpoints_written: 0,
            snapshot_tx,
        }
    }

    /// Builds the policy, the instruments and the CSV writer from
    /// configuration.
    ///
    /// # Errors
    ///
    /// Fails before anything touches hardware when the recording policy is
    /// invalid; otherwise propagates instrument and output directory errors.
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let policy = config.scan.policy()?;
        let sink = CsvCheckpointWriter::open(&config.storage.output_dir, config.storage.create_dir)?;
        let suite = InstrumentSuite::from_config(&config.instruments).await?;

        info!(
            "Scan controller ready: step_record={}, step_background={}, tolerance={}",
            policy.step_record(),
            policy.step_background(),
            policy.tolerance()
        );
        Ok(Self::new(
            suite,
            Box::new(sink),
            policy,
            config.scan.poll_interval(),
        ))
    }

    /// Current session.
    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> DashboardSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// A receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Runs one iteration: poll, step, checkpoint, publish.
    ///
    /// # Errors
    ///
    /// Only configuration errors escape; instrument and storage failures are
    /// logged and reported in the returned [`IterationReport`].
    pub async fn iterate(&mut self) -> AppResult<IterationReport> {
        let bundle = SampleBundle::acquire(&mut self.suite).await;
        for (what, e) in bundle.failures() {
            warn!("{what} read failed: {e}");
        }

        let step = self.advance(&bundle).await?;
        self.iteration += 1;
        self.publish(Some(&bundle));

        Ok(IterationReport {
            iteration: self.iteration,
            state: self.session.state(),
            step,
        })
    }

    async fn advance(&mut self, bundle: &SampleBundle) -> AppResult<StepOutcome> {
        if !self.session.is_scanning() {
            return Ok(StepOutcome::Idle);
        }

        let Some(step) = self.session.plan_step(&self.policy)? else {
            return Ok(StepOutcome::Idle);
        };

        if let Err(e) = self.suite.laser.set_piezo(step.position).await {
            warn!("Piezo move to {:.2} failed: {e}", step.position);
            return Ok(StepOutcome::Held {
                error: e.to_string(),
            });
        }
        self.session.commit(&step);

        let checkpoint = if !step.checkpoint {
            None
        } else if let Some(streams) = bundle.checkpoint_streams() {
            Some(self.write_checkpoint(streams).await)
        } else {
            let failed = bundle.failed_readings();
            warn!(
                "Checkpoint at piezo {:.2} skipped: {} unavailable",
                step.position,
                failed.join(", ")
            );
            Some(CheckpointOutcome::Aborted { failed })
        };

        Ok(StepOutcome::Advanced {
            position: step.position,
            checkpoint,
        })
    }

    async fn write_checkpoint(&mut self, streams: Vec<(StreamId, &Trace)>) -> CheckpointOutcome {
        let file_id = self.session.take_file_id();
        let piezo_position = self.session.piezo_position();
        let checkpoint = Checkpoint {
            file_id,
            piezo_position,
            streams,
        };

        match self.sink.write(&checkpoint).await {
            Ok(files) => {
                self.checkpoints_written += 1;
                info!(
                    "Checkpoint {file_id} at piezo {piezo_position:.2}: {} files",
                    files.len()
                );
                CheckpointOutcome::Written { file_id, files }
            }
            Err(e) => {
                error!("Checkpoint {file_id} at piezo {piezo_position:.2} failed: {e}");
                CheckpointOutcome::Failed {
                    file_id,
                    error: e.to_string(),
                }
            }
        }
    }

    fn publish(&self, bundle: Option<&SampleBundle>) {
        let session = &self.session;
        self.snapshot_tx.send_modify(|snapshot| {
            if let Some(bundle) = bundle {
                for (stream, result) in bundle.spectra() {
                    if let Some(view) = snapshot.stream_mut(stream) {
                        view.update(result);
                    }
                }
                snapshot.laser_power = bundle.laser_power.as_ref().ok().copied();
                snapshot.laser_wavelength = bundle.laser_wavelength.as_ref().ok().copied();
            }
            snapshot.state = session.state();
            snapshot.file_id = session.file_id();
            snapshot.piezo_position = session.piezo_position();
            snapshot.accumulated_displacement = session.accumulated_displacement();
            snapshot.iteration = self.iteration;
            snapshot.checkpoints_written = self.checkpoints_written;
            snapshot.updated_at = Utc::now();
        });
    }

    /// Applies an operator command. Returns `false` when the loop should
    /// exit.
    pub fn handle_command(&mut self, command: ScanCommand) -> bool {
        match command {
            ScanCommand::Start {
                file_id_start,
                piezo_start,
                response,
            } => {
                self.session.start(file_id_start, piezo_start);
                info!("Scanning started: file id {file_id_start}, piezo {piezo_start:.2}");
                self.publish(None);
                let _ = response.send(());
            }

            ScanCommand::Stop { response } => {
                self.session.stop();
                info!(
                    "Scanning stopped at piezo {:.2}, next file id {}",
                    self.session.piezo_position(),
                    self.session.file_id()
                );
                self.publish(None);
                let _ = response.send(());
            }

            ScanCommand::Status { response } => {
                let _ = response.send(self.snapshot());
            }

            ScanCommand::Shutdown { response } => {
                info!("Scan controller shutting down");
                let _ = response.send(());
                return false;
            }
        }
        true
    }

    /// Runs the loop until a Shutdown command arrives or every handle is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns the first non-recoverable iteration error.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ScanCommand>) -> AppResult<()> {
        info!(
            "Scan controller started: {} streams, polling every {:?}",
            self.suite.streams().len(),
            self.poll_interval
        );

        loop {
            match self.iterate().await {
                Ok(report) => debug!("Iteration {}: {:?}", report.iteration, report.step),
                Err(e) if e.is_recoverable() => warn!("Iteration failed: {e}"),
                Err(e) => {
                    error!("Scan loop aborted: {e}");
                    return Err(e);
                }
            }

            let delay = tokio::time::sleep(self.poll_interval);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    () = &mut delay => break,
                    command = commands.recv() => match command {
                        Some(command) => {
                            if !self.handle_command(command) {
                                return Ok(());
                            }
                        }
                        None => {
                            info!("All scan handles dropped; stopping");
                            return Ok(());
                        }
                    },
                }
            }
        }
    }

    /// Moves the controller onto its own task.
    pub fn spawn(self) -> (ScanHandle, JoinHandle<AppResult<()>>) {
        let (commands, rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = ScanHandle {
            commands,
            snapshots: self.subscribe(),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }
}

/// Cloneable front-end side of a spawned [`ScanController`].
#[derive(Clone)]
pub struct ScanHandle {
    commands: mpsc::Sender<ScanCommand>,
    snapshots: watch::Receiver<DashboardSnapshot>,
}

impl ScanHandle {
    async fn send(&self, command: ScanCommand) -> AppResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DaqError::ChannelClosed)
    }

    /// Starts (or restarts) a scan and waits until the loop applied it.
    ///
    /// # Errors
    ///
    /// [`DaqError::ChannelClosed`] if the loop has exited.
    pub async fn start(&self, file_id_start: u64, piezo_start: f64) -> AppResult<()> {
        let (command, rx) = ScanCommand::start(file_id_start, piezo_start);
        self.send(command).await?;
        rx.await.map_err(|_| DaqError::ChannelClosed)
    }

    /// Stops the scan and waits until the loop applied it.
    ///
    /// # Errors
    ///
    /// [`DaqError::ChannelClosed`] if the loop has exited.
    pub async fn stop(&self) -> AppResult<()> {
        let (command, rx) = ScanCommand::stop();
        self.send(command).await?;
        rx.await.map_err(|_| DaqError::ChannelClosed)
    }

    /// Asks the loop for its current snapshot.
    ///
    /// # Errors
    ///
    /// [`DaqError::ChannelClosed`] if the loop has exited.
    pub async fn status(&self) -> AppResult<DashboardSnapshot> {
        let (command, rx) = ScanCommand::status();
        self.send(command).await?;
        rx.await.map_err(|_| DaqError::ChannelClosed)
    }

    /// Asks the loop to exit after the current iteration.
    ///
    /// # Errors
    ///
    /// [`DaqError::ChannelClosed`] if the loop has already exited.
    pub async fn shutdown(&self) -> AppResult<()> {
        let (command, rx) = ScanCommand::shutdown();
        self.send(command).await?;
        rx.await.map_err(|_| DaqError::ChannelClosed)
    }

    /// Queues a command without waiting, for callers outside the runtime.
    ///
    /// # Errors
    ///
    /// [`DaqError::CommandQueueFull`] or [`DaqError::ChannelClosed`].
    pub fn try_send(&self, command: ScanCommand) -> AppResult<()> {
        self.commands.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DaqError::CommandQueueFull,
            mpsc::error::TrySendError::Closed(_) => DaqError::ChannelClosed,
        })
    }

    /// Receiver of published snapshots.
    pub fn snapshots(&self) -> watch::Receiver<DashboardSnapshot> {
        self.snapshots.clone()
    }

    /// Most recently published snapshot.
    pub fn latest(&self) -> DashboardSnapshot {
        self.snapshots.borrow().clone()
    }
}
