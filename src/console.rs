//! Headless operator console.
//!
//! Reads one command per line:
//!
//! ```text
//! start [file_id] [piezo_start]   begin a scan (defaults from config/CLI)
//! stop                            stop advancing the piezo
//! status                          log the current indicators
//! help                            list commands
//! quit                            leave
//! ```

use crate::{
    error::{AppResult, DaqError},
    scan::ScanHandle,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

/// A parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    /// Start a scan, optionally overriding the defaults
    Start {
        /// File id of the first checkpoint
        file_id: Option<u64>,
        /// Starting piezo position
        piezo_start: Option<f64>,
    },
    /// Stop the scan
    Stop,
    /// Report the indicators
    Status,
    /// List commands
    Help,
    /// Leave the console
    Quit,
}

impl OperatorCommand {
    /// Parses one line. Keywords are case-insensitive.
    ///
    /// # Errors
    ///
    /// [`DaqError::Parse`] for unknown commands, bad numbers or extra
    /// arguments.
    pub fn parse(line: &str) -> AppResult<Self> {
        let mut words = line.split_whitespace();
        let keyword = words
            .next()
            .ok_or_else(|| DaqError::Parse("empty command".to_string()))?
            .to_ascii_lowercase();

        let command = match keyword.as_str() {
            "start" => {
                let file_id = words
                    .next()
                    .map(|w| {
                        w.parse::<u64>()
                            .map_err(|_| DaqError::Parse(format!("invalid file id '{w}'")))
                    })
                    .transpose()?;
                let piezo_start = words
                    .next()
                    .map(|w| {
                        w.parse::<f64>()
                            .ok()
                            .filter(|v| v.is_finite())
                            .ok_or_else(|| DaqError::Parse(format!("invalid piezo start '{w}'")))
                    })
                    .transpose()?;
                OperatorCommand::Start {
                    file_id,
                    piezo_start,
                }
            }
            "stop" => OperatorCommand::Stop,
            "status" => OperatorCommand::Status,
            "help" | "?" => OperatorCommand::Help,
            "quit" | "exit" => OperatorCommand::Quit,
            other => return Err(DaqError::Parse(format!("unknown command '{other}'"))),
        };

        if let Some(extra) = words.next() {
            return Err(DaqError::Parse(format!("unexpected argument '{extra}'")));
        }
        Ok(command)
    }
}

/// Values used by `start` when the operator omits them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartDefaults {
    /// File id of the first checkpoint
    pub file_id: u64,
    /// Starting piezo position
    pub piezo_start: f64,
}

/// Reads commands from `input` until `quit` or end of input.
///
/// Bad lines are logged and ignored.
///
/// # Errors
///
/// [`DaqError::Io`] if reading fails, [`DaqError::ChannelClosed`] if the
/// scan loop has exited.
pub async fn run_console<R>(input: R, handle: &ScanHandle, defaults: StartDefaults) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match OperatorCommand::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                warn!("{e} (type 'help' for commands)");
                continue;
            }
        };

        match command {
            OperatorCommand::Start {
                file_id,
                piezo_start,
            } => {
                handle
                    .start(
                        file_id.unwrap_or(defaults.file_id),
                        piezo_start.unwrap_or(defaults.piezo_start),
                    )
                    .await?;
            }
            OperatorCommand::Stop => handle.stop().await?,
            OperatorCommand::Status => {
                let snapshot = handle.status().await?;
                info!("{}", snapshot.status_line());
            }
            OperatorCommand::Help => {
                info!("Commands: start [file_id] [piezo_start] | stop | status | help | quit");
            }
            OperatorCommand::Quit => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        instrument::{InstrumentSuite, MockLaser, MockSpectrumAnalyzer},
        scan::{RecordingPolicy, ScanController, ScanState},
        storage::CsvCheckpointWriter,
    };
    use std::time::Duration;
    use tokio::task::JoinHandle;

    const DEFAULTS: StartDefaults = StartDefaults {
        file_id: 3,
        piezo_start: 0.25,
    };

    /// A loop that never reaches a second iteration during the test.
    fn spawn_bench(dir: &std::path::Path) -> (ScanHandle, JoinHandle<AppResult<()>>) {
        let suite = InstrumentSuite {
            osa1: Box::new(MockSpectrumAnalyzer::optical("osa1").with_points(4)),
            osa2: Box::new(MockSpectrumAnalyzer::optical("osa2").with_points(4)),
            esa: None,
            laser: Box::new(MockLaser::new("laser")),
        };
        let sink = CsvCheckpointWriter::open(dir, true).unwrap();
        let policy = RecordingPolicy::new(0.5, 0.1).unwrap();
        ScanController::new(suite, Box::new(sink), policy, Duration::from_secs(60)).spawn()
    }

    #[tokio::test]
    async fn test_console_script_drives_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, task) = spawn_bench(dir.path());

        let script: &[u8] = b"start 7 1.5\nbogus\n\nstatus\nstop\nquit\nstart\n";
        run_console(script, &handle, DEFAULTS).await.unwrap();

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, ScanState::Idle);
        assert_eq!(status.file_id, 7);
        assert_eq!(status.piezo_position, 1.5);

        handle.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bare_start_uses_defaults_until_end_of_input() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, task) = spawn_bench(dir.path());

        let script: &[u8] = b"help\nstart\n";
        run_console(script, &handle, DEFAULTS).await.unwrap();

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, ScanState::Scanning);
        assert_eq!(status.file_id, 3);
        assert_eq!(status.piezo_position, 0.25);

        handle.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_closed_loop_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, task) = spawn_bench(dir.path());
        handle.shutdown().await.unwrap();
        task.await.unwrap().unwrap();

        let script: &[u8] = b"stop\n";
        assert!(matches!(
            run_console(script, &handle, DEFAULTS).await,
            Err(DaqError::ChannelClosed)
        ));
    }

    #[test]
    fn test_parse_start_variants() {
        assert_eq!(
            OperatorCommand::parse("start").unwrap(),
            OperatorCommand::Start {
                file_id: None,
                piezo_start: None
            }
        );
        assert_eq!(
            OperatorCommand::parse("  START 7 12.5 ").unwrap(),
            OperatorCommand::Start {
                file_id: Some(7),
                piezo_start: Some(12.5)
            }
        );
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(OperatorCommand::parse("stop").unwrap(), OperatorCommand::Stop);
        assert_eq!(OperatorCommand::parse("Status").unwrap(), OperatorCommand::Status);
        assert_eq!(OperatorCommand::parse("exit").unwrap(), OperatorCommand::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert!(OperatorCommand::parse("").is_err());
        assert!(OperatorCommand::parse("jump").is_err());
        assert!(OperatorCommand::parse("start -1").is_err());
        assert!(OperatorCommand::parse("start 1 nan").is_err());
        assert!(OperatorCommand::parse("stop now").is_err());
    }
}
