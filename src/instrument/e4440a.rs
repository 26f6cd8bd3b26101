//! Agilent E4440A PSA electrical spectrum analyzer.
//!
//! The analyzer only returns amplitudes, so the frequency axis is rebuilt
//! from the sweep span: `points` values evenly spaced from start to stop.

use super::{
    scpi::{parse_ascii_values, parse_scalar, ScpiTransport},
    SpectrumAnalyzer, Trace,
};
use crate::error::{AppResult, DaqError};
use async_trait::async_trait;
use tracing::{debug, warn};

/// E4440A ESA driver.
pub struct E4440aEsa {
    name: String,
    transport: Box<dyn ScpiTransport>,
    trace: String,
    ascii_configured: bool,
}

impl E4440aEsa {
    /// Creates a driver reading `TRACE1`.
    pub fn new(name: &str, transport: Box<dyn ScpiTransport>) -> Self {
        Self {
            name: name.to_string(),
            transport,
            trace: "TRACE1".to_string(),
            ascii_configured: false,
        }
    }

    /// Reads another trace (`TRACE1`..`TRACE3`).
    pub fn with_trace(mut self, trace: &str) -> Self {
        self.trace = trace.to_string();
        self
    }

    async fn read_trace(&mut self) -> AppResult<Trace> {
        if !self.ascii_configured {
            self.transport.write(":FORMat:TRACe:DATA ASCii").await?;
            self.ascii_configured = true;
        }

        let start = parse_scalar(&self.transport.query(":SENSe:FREQuency:STARt?").await?)?;
        let stop = parse_scalar(&self.transport.query(":SENSe:FREQuency:STOP?").await?)?;
        let points = parse_scalar(&self.transport.query(":SENSe:SWEep:POINts?").await?)?;
        let amplitudes = parse_ascii_values(
            &self
                .transport
                .query(&format!(":TRACe:DATA? {}", self.trace))
                .await?,
        )?;

        if amplitudes.is_empty() {
            return Err(DaqError::Instrument(format!("{}: empty trace", self.name)));
        }
        if points as usize != amplitudes.len() {
            warn!(
                "{}: sweep reports {} points but trace holds {}",
                self.name,
                points,
                amplitudes.len()
            );
        }

        let frequencies = linear_axis(start, stop, amplitudes.len());
        debug!("{}: {} points, {start} Hz to {stop} Hz", self.name, amplitudes.len());
        Trace::new(frequencies, amplitudes)
    }
}

/// `n` evenly spaced values from `start` to `stop` inclusive.
pub(crate) fn linear_axis(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

#[async_trait]
impl SpectrumAnalyzer for E4440aEsa {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_trace(&mut self) -> AppResult<Trace> {
        let result = self.read_trace().await;
        if result.is_err() {
            self.ascii_configured = false;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;

    fn scripted() -> MockAdapter {
        MockAdapter::new("GPIB0::18::INSTR")
            .with_response(":SENSe:FREQuency:STARt?", "+1.00000000000E+006")
            .with_response(":SENSe:FREQuency:STOP?", "+5.00000000000E+006")
            .with_response(":SENSe:SWEep:POINts?", "+5")
            .with_response(":TRACe:DATA? TRACE1", "-90.1,-88.0,-20.5,-87.9,-90.3")
    }

    #[test]
    fn test_linear_axis() {
        assert_eq!(linear_axis(0.0, 4.0, 5), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(linear_axis(3.0, 9.0, 1), vec![3.0]);
        assert!(linear_axis(0.0, 1.0, 0).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_trace_builds_frequency_axis() {
        let mut esa = E4440aEsa::new("esa", Box::new(scripted()));
        let trace = esa.fetch_trace().await.unwrap();
        assert_eq!(trace.len(), 5);
        assert_eq!(trace.coordinates()[0], 1.0e6);
        assert_eq!(trace.coordinates()[4], 5.0e6);
        assert_eq!(trace.values()[2], -20.5);
    }

    #[tokio::test]
    async fn test_point_count_follows_trace() {
        let adapter = scripted().with_response(":SENSe:SWEep:POINts?", "601");
        let mut esa = E4440aEsa::new("esa", Box::new(adapter));
        let trace = esa.fetch_trace().await.unwrap();
        assert_eq!(trace.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_trace_is_an_error() {
        let adapter = scripted().with_response(":TRACe:DATA? TRACE1", "");
        let mut esa = E4440aEsa::new("esa", Box::new(adapter));
        assert!(esa.fetch_trace().await.is_err());
    }
}
