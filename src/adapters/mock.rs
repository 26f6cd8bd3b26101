//! Mock SCPI transport for testing
//!
//! Provides a simulated instrument link so drivers can be tested without
//! hardware:
//! - Scripted responses per query string
//! - Controllable failure injection
//! - Call logging for test verification

use crate::{
    error::{AppResult, DaqError},
    instrument::scpi::ScpiTransport,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Mock SCPI transport
///
/// Clones share the script, the failure flag and the call log, so a test can
/// hand one clone to a driver and inspect the other.
///
/// # Example
///
/// ```
/// use coupling_daq::adapters::MockAdapter;
///
/// let adapter = MockAdapter::new("GPIB0::4::INSTR").with_response("*IDN?", "YOKOGAWA,AQ6370D");
/// assert!(adapter.call_log().is_empty());
/// ```
#[derive(Clone)]
pub struct MockAdapter {
    resource: String,
    responses: Arc<Mutex<HashMap<String, String>>>,
    should_fail_next: Arc<AtomicBool>,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl MockAdapter {
    /// Create a mock bound to `resource` with an empty script
    pub fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            responses: Arc::new(Mutex::new(HashMap::new())),
            should_fail_next: Arc::new(AtomicBool::new(false)),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Script the answer to `command`, replacing any previous one
    pub fn with_response(self, command: &str, response: &str) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(command.to_string(), response.to_string());
        }
        self
    }

    /// Inject a failure for the next operation
    pub fn inject_next_failure(&self) {
        self.should_fail_next.store(true, Ordering::SeqCst);
    }

    fn check_failure(&self) -> bool {
        self.should_fail_next.swap(false, Ordering::SeqCst)
    }

    /// Get the call log
    pub fn call_log(&self) -> Vec<String> {
        self.call_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Clear the call log
    pub fn clear_log(&self) {
        if let Ok(mut log) = self.call_log.lock() {
            log.clear();
        }
    }

    fn log_call(&self, call: String) {
        if let Ok(mut log) = self.call_log.lock() {
            log.push(call);
        }
    }
}

#[async_trait]
impl ScpiTransport for MockAdapter {
    async fn query(&self, command: &str) -> AppResult<String> {
        self.log_call(format!("query: {command}"));

        if self.check_failure() {
            return Err(DaqError::Instrument("Injected failure".to_string()));
        }

        self.responses
            .lock()
            .ok()
            .and_then(|responses| responses.get(command).cloned())
            .ok_or_else(|| DaqError::Instrument(format!("no scripted response for '{command}'")))
    }

    async fn write(&self, command: &str) -> AppResult<()> {
        self.log_call(format!("write: {command}"));

        if self.check_failure() {
            return Err(DaqError::Instrument("Injected failure".to_string()));
        }
        Ok(())
    }

    fn resource(&self) -> &str {
        &self.resource
    }
}
