//! Yokogawa AQ63xx optical spectrum analyzer.
//!
//! Reads the active trace as two ASCII blocks: `:TRACe:X?` (wavelength in
//! metres, converted to nm) and `:TRACe:Y?` (level in dBm).

use super::{
    scpi::{parse_ascii_values, ScpiTransport},
    SpectrumAnalyzer, Trace,
};
use crate::error::AppResult;
use async_trait::async_trait;
use tracing::debug;

const METRES_TO_NM: f64 = 1e9;

/// AQ63xx OSA driver.
pub struct Aq6370Osa {
    name: String,
    transport: Box<dyn ScpiTransport>,
    trace: String,
    ascii_configured: bool,
}

impl Aq6370Osa {
    /// Creates a driver reading trace `TRA`.
    pub fn new(name: &str, transport: Box<dyn ScpiTransport>) -> Self {
        Self {
            name: name.to_string(),
            transport,
            trace: "TRA".to_string(),
            ascii_configured: false,
        }
    }

    /// Reads another trace (`TRA`..`TRG`).
    pub fn with_trace(mut self, trace: &str) -> Self {
        self.trace = trace.to_string();
        self
    }

    async fn read_trace(&mut self) -> AppResult<Trace> {
        if !self.ascii_configured {
            self.transport.write(":FORMat:DATA ASCii").await?;
            self.ascii_configured = true;
        }

        let x = self
            .transport
            .query(&format!(":TRACe:X? {}", self.trace))
            .await?;
        let y = self
            .transport
            .query(&format!(":TRACe:Y? {}", self.trace))
            .await?;

        let wavelengths = parse_ascii_values(&x)?
            .into_iter()
            .map(|metres| metres * METRES_TO_NM)
            .collect();
        let trace = Trace::new(wavelengths, parse_ascii_values(&y)?)?;
        debug!("{}: {} points from {}", self.name, trace.len(), self.transport.resource());
        Ok(trace)
    }
}

#[async_trait]
impl SpectrumAnalyzer for Aq6370Osa {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_trace(&mut self) -> AppResult<Trace> {
        let result = self.read_trace().await;
        if result.is_err() {
            // the transport may have reconnected; re-send the format on the next read
            self.ascii_configured = false;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;

    #[tokio::test]
    async fn test_fetch_trace_converts_to_nm() {
        let adapter = MockAdapter::new("GPIB0::4::INSTR")
            .with_response(":TRACe:X? TRA", "+1.59100000E-006,+1.59200000E-006")
            .with_response(":TRACe:Y? TRA", "-65.0,-40.5");
        let mut osa = Aq6370Osa::new("osa1", Box::new(adapter.clone()));

        let trace = osa.fetch_trace().await.unwrap();
        assert!((trace.coordinates()[0] - 1591.0).abs() < 1e-9);
        assert!((trace.coordinates()[1] - 1592.0).abs() < 1e-9);
        assert_eq!(trace.values(), &[-65.0, -40.5]);
        assert_eq!(
            adapter.call_log(),
            vec![
                "write: :FORMat:DATA ASCii",
                "query: :TRACe:X? TRA",
                "query: :TRACe:Y? TRA"
            ]
        );
    }

    #[tokio::test]
    async fn test_format_sent_once() {
        let adapter = MockAdapter::new("GPIB0::4::INSTR")
            .with_response(":TRACe:X? TRB", "1e-6")
            .with_response(":TRACe:Y? TRB", "-50");
        let mut osa = Aq6370Osa::new("osa1", Box::new(adapter.clone())).with_trace("TRB");

        osa.fetch_trace().await.unwrap();
        osa.fetch_trace().await.unwrap();
        let writes = adapter
            .call_log()
            .iter()
            .filter(|c| c.starts_with("write"))
            .count();
        assert_eq!(writes, 1);
    }

    #[tokio::test]
    async fn test_failure_resends_format() {
        let adapter = MockAdapter::new("GPIB0::4::INSTR")
            .with_response(":TRACe:X? TRA", "1e-6")
            .with_response(":TRACe:Y? TRA", "-50");
        let mut osa = Aq6370Osa::new("osa1", Box::new(adapter.clone()));

        osa.fetch_trace().await.unwrap();
        adapter.inject_next_failure();
        assert!(osa.fetch_trace().await.is_err());
        osa.fetch_trace().await.unwrap();

        let writes = adapter
            .call_log()
            .iter()
            .filter(|c| c.starts_with("write"))
            .count();
        assert_eq!(writes, 2);
    }

    #[tokio::test]
    async fn test_mismatched_axes_rejected() {
        let adapter = MockAdapter::new("GPIB0::4::INSTR")
            .with_response(":TRACe:X? TRA", "1e-6,2e-6")
            .with_response(":TRACe:Y? TRA", "-50");
        let mut osa = Aq6370Osa::new("osa1", Box::new(adapter));
        assert!(osa.fetch_trace().await.is_err());
    }
}
