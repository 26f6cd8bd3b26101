//! VISA transport for GPIB/USB/Ethernet instruments
//!
//! Implements [`ScpiTransport`] on top of the system VISA library through the
//! `visa-rs` binding. VISA calls are blocking, so every exchange runs on
//! Tokio's blocking pool.
//!
//! The session is opened lazily on first use and dropped after any I/O
//! failure; the next command reopens it. A GPIB instrument that was power
//! cycled or timed out therefore recovers on the following poll.

use crate::{
    error::{AppResult, DaqError},
    instrument::scpi::ScpiTransport,
};
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "instrument_visa")]
use std::sync::Arc;
#[cfg(feature = "instrument_visa")]
use tokio::sync::Mutex;
#[cfg(feature = "instrument_visa")]
use tracing::{debug, warn};

/// An open VISA session. The resource manager must outlive the instrument
/// session, so both are kept together.
#[cfg(feature = "instrument_visa")]
struct VisaSession {
    _rm: visa_rs::DefaultRM,
    instrument: visa_rs::Instrument,
}

#[cfg(feature = "instrument_visa")]
impl VisaSession {
    fn open(resource: &str, timeout: Duration) -> AppResult<Self> {
        use std::ffi::CString;
        use visa_rs::prelude::*;

        let rm = DefaultRM::new()
            .map_err(|e| DaqError::Instrument(format!("VISA resource manager: {e}")))?;
        let name = CString::new(resource)
            .map_err(|_| DaqError::Configuration(format!("invalid VISA resource '{resource}'")))?;
        let instrument = rm
            .open(&name.into(), AccessMode::NO_LOCK, timeout)
            .map_err(|e| DaqError::Instrument(format!("failed to open '{resource}': {e}")))?;

        Ok(Self {
            _rm: rm,
            instrument,
        })
    }

    fn send(&mut self, line: &str) -> std::io::Result<()> {
        use std::io::Write;
        self.instrument.write_all(line.as_bytes())
    }

    fn read_line(&mut self) -> std::io::Result<String> {
        use std::io::{BufRead, BufReader};
        let mut response = String::new();
        BufReader::new(&self.instrument).read_line(&mut response)?;
        Ok(response.trim().to_string())
    }
}

/// VISA transport for SCPI instruments
///
/// Supports resource strings like:
/// - "GPIB0::4::INSTR" (GPIB interface)
/// - "USB0::0x104D::0x100A::SERIAL::INSTR" (USB)
/// - "TCPIP0::192.168.1.100::INSTR" (Ethernet/LXI)
pub struct VisaAdapter {
    /// VISA resource string (e.g., "GPIB0::4::INSTR")
    pub(crate) resource_string: String,

    /// Open timeout
    pub(crate) timeout: Duration,

    /// Line terminator for commands (typically "\n" for SCPI)
    pub(crate) line_terminator: String,

    #[cfg(feature = "instrument_visa")]
    session: Arc<Mutex<Option<VisaSession>>>,
}

impl VisaAdapter {
    /// Create a new VISA adapter with default settings
    ///
    /// # Arguments
    /// * `resource_string` - VISA resource identifier (e.g., "GPIB0::4::INSTR")
    pub fn new(resource_string: String) -> Self {
        Self {
            resource_string,
            timeout: Duration::from_secs(5),
            line_terminator: "\n".to_string(),
            #[cfg(feature = "instrument_visa")]
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Set open timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Human readable description for logs.
    pub fn info(&self) -> String {
        format!(
            "VisaAdapter({} @ {}ms timeout, terminator {:?})",
            self.resource_string,
            self.timeout.as_millis(),
            self.line_terminator
        )
    }

    /// Runs one exchange on the blocking pool, opening the session if needed
    /// and dropping it when the exchange fails.
    #[cfg(feature = "instrument_visa")]
    async fn exchange(&self, command: &str, expect_response: bool) -> AppResult<String> {
        let session = self.session.clone();
        let resource = self.resource_string.clone();
        let timeout = self.timeout;
        let line = format!("{}{}", command, self.line_terminator);
        let command = command.to_string();

        tokio::task::spawn_blocking(move || {
            let mut guard = session.blocking_lock();
            if guard.is_none() {
                *guard = Some(VisaSession::open(&resource, timeout)?);
                debug!("VISA resource '{}' opened", resource);
            }

            let result = match guard.as_mut() {
                Some(open) => open.send(&line).and_then(|()| {
                    if expect_response {
                        open.read_line()
                    } else {
                        Ok(String::new())
                    }
                }),
                None => return Err(DaqError::Instrument(format!("'{resource}' not connected"))),
            };

            match result {
                Ok(response) => {
                    debug!("VISA '{}' -> '{}'", command.trim(), response);
                    Ok(response)
                }
                Err(e) => {
                    *guard = None;
                    warn!("VISA '{}' failed on '{}'; session closed", command.trim(), resource);
                    Err(DaqError::Instrument(format!(
                        "{resource}: '{}' failed: {e}",
                        command.trim()
                    )))
                }
            }
        })
        .await
        .map_err(|e| DaqError::Instrument(format!("VISA I/O task failed: {e}")))?
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn exchange(&self, _command: &str, _expect_response: bool) -> AppResult<String> {
        Err(DaqError::FeatureNotEnabled("instrument_visa".to_string()))
    }
}

#[async_trait]
impl ScpiTransport for VisaAdapter {
    async fn query(&self, command: &str) -> AppResult<String> {
        self.exchange(command, true).await
    }

    async fn write(&self, command: &str) -> AppResult<()> {
        self.exchange(command, false).await.map(|_| ())
    }

    fn resource(&self) -> &str {
        &self.resource_string
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visa_adapter_creation() {
        let adapter = VisaAdapter::new("GPIB0::4::INSTR".to_string());
        assert_eq!(adapter.resource(), "GPIB0::4::INSTR");
        assert_eq!(adapter.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_visa_adapter_builder() {
        let adapter = VisaAdapter::new("GPIB0::18::INSTR".to_string())
            .with_timeout(Duration::from_millis(2000));

        assert_eq!(adapter.timeout, Duration::from_millis(2000));
        assert_eq!(adapter.line_terminator, "\n");
    }

    #[test]
    fn test_info_string() {
        let adapter = VisaAdapter::new("GPIB0::1::INSTR".to_string())
            .with_timeout(Duration::from_millis(3000));
        let info = adapter.info();
        assert!(info.contains("GPIB0::1::INSTR"));
        assert!(info.contains("3000ms"));
    }

    #[cfg(not(feature = "instrument_visa"))]
    #[tokio::test]
    async fn test_query_without_visa_feature() {
        let adapter = VisaAdapter::new("GPIB0::4::INSTR".to_string());
        let err = adapter.query("*IDN?").await.unwrap_err();
        assert!(matches!(err, DaqError::FeatureNotEnabled(_)));
    }
}
