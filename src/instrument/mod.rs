//! Instrument seams used by the scan loop.
//!
//! The loop only needs two capabilities:
//!
//! - [`SpectrumAnalyzer`]: "fetch the current trace", a paired
//!   coordinate/value series (OSA wavelength vs. power, ESA frequency vs.
//!   power).
//! - [`TunableLaser`]: switch on, move the piezo, read power and wavelength.
//!
//! Concrete drivers talk SCPI through an [`ScpiTransport`](scpi::ScpiTransport)
//! (VISA in production, a scripted mock in tests). Synthetic instruments in
//! [`mock`] stand in for the whole bench.

pub mod aq6370;
pub mod e4440a;
pub mod mock;
pub mod scpi;
pub mod tlb6700;

use crate::{
    adapters::VisaAdapter,
    config::{InstrumentConfig, InstrumentKind, InstrumentsConfig},
    error::{AppResult, DaqError},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

pub use aq6370::Aq6370Osa;
pub use e4440a::E4440aEsa;
pub use mock::{MockLaser, MockSpectrumAnalyzer};
pub use tlb6700::Tlb6700Laser;

/// A fixed-shape numeric series returned by a spectrum instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    coordinates: Vec<f64>,
    values: Vec<f64>,
}

impl Trace {
    /// Pairs coordinates with values.
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Instrument`] when the two arrays differ in length.
    pub fn new(coordinates: Vec<f64>, values: Vec<f64>) -> AppResult<Self> {
        if coordinates.len() != values.len() {
            return Err(DaqError::Instrument(format!(
                "trace shape mismatch: {} coordinates vs {} values",
                coordinates.len(),
                values.len()
            )));
        }
        Ok(Self {
            coordinates,
            values,
        })
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the trace holds no points.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Horizontal axis (wavelength or frequency).
    pub fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }

    /// Measured values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// `[coordinate, value]` pairs, the shape plotting code expects.
    pub fn points(&self) -> impl Iterator<Item = [f64; 2]> + '_ {
        self.coordinates
            .iter()
            .zip(self.values.iter())
            .map(|(&x, &y)| [x, y])
    }
}

/// The three spectrum streams of the bench, in file-index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamId {
    /// First optical spectrum analyzer.
    Osa1,
    /// Second optical spectrum analyzer.
    Osa2,
    /// Electrical spectrum analyzer.
    Esa,
}

impl StreamId {
    /// Suffix used in checkpoint file names.
    pub fn file_index(self) -> u8 {
        match self {
            StreamId::Osa1 => 1,
            StreamId::Osa2 => 2,
            StreamId::Esa => 3,
        }
    }

    /// Short display label.
    pub fn label(self) -> &'static str {
        match self {
            StreamId::Osa1 => "OSA1",
            StreamId::Osa2 => "OSA2",
            StreamId::Esa => "ESA",
        }
    }

    /// Name of the horizontal axis.
    pub fn coordinate_name(self) -> &'static str {
        match self {
            StreamId::Osa1 | StreamId::Osa2 => "wavelength",
            StreamId::Esa => "frequency",
        }
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// An instrument that returns a whole spectrum per read.
#[async_trait]
pub trait SpectrumAnalyzer: Send {
    /// Instrument name for logs.
    fn name(&self) -> &str;

    /// Reads the current trace. Blocks (asynchronously) until the
    /// instrument answers or its transport times out.
    async fn fetch_trace(&mut self) -> AppResult<Trace>;
}

/// A tunable laser with a piezo fine-tuning actuator.
#[async_trait]
pub trait TunableLaser: Send {
    /// Instrument name for logs.
    fn name(&self) -> &str;

    /// Switches the laser output on.
    async fn enable(&mut self) -> AppResult<()>;

    /// Moves the piezo to `position`.
    async fn set_piezo(&mut self, position: f64) -> AppResult<()>;

    /// Current output power.
    async fn read_power(&mut self) -> AppResult<f64>;

    /// Current wavelength in nm.
    async fn read_wavelength(&mut self) -> AppResult<f64>;
}

/// Every instrument the scan loop polls.
pub struct InstrumentSuite {
    /// First OSA, file index 1.
    pub osa1: Box<dyn SpectrumAnalyzer>,
    /// Second OSA, file index 2.
    pub osa2: Box<dyn SpectrumAnalyzer>,
    /// Optional ESA, file index 3.
    pub esa: Option<Box<dyn SpectrumAnalyzer>>,
    /// Laser whose piezo is scanned.
    pub laser: Box<dyn TunableLaser>,
}

impl InstrumentSuite {
    /// Streams this suite produces, in file-index order.
    pub fn streams(&self) -> Vec<StreamId> {
        let mut streams = vec![StreamId::Osa1, StreamId::Osa2];
        if self.esa.is_some() {
            streams.push(StreamId::Esa);
        }
        streams
    }

    /// Builds every instrument from configuration and switches the laser on.
    ///
    /// # Errors
    ///
    /// - [`DaqError::FeatureNotEnabled`] for a VISA instrument when the crate
    ///   was built without `instrument_visa`.
    /// - Any error from switching the laser on.
    pub async fn from_config(config: &InstrumentsConfig) -> AppResult<Self> {
        let osa1 = build_osa("osa1", &config.osa1)?;
        let osa2 = build_osa("osa2", &config.osa2)?;
        let esa = if config.esa.enabled {
            Some(build_esa("esa", &config.esa)?)
        } else {
            info!("ESA disabled; checkpoints will hold two streams");
            None
        };
        let mut laser = build_laser("laser", &config.laser)?;

        laser.enable().await?;
        info!("Laser '{}' switched on", laser.name());

        Ok(Self {
            osa1,
            osa2,
            esa,
            laser,
        })
    }
}

fn visa_transport(id: &str, config: &InstrumentConfig) -> AppResult<VisaAdapter> {
    if !cfg!(feature = "instrument_visa") {
        return Err(DaqError::FeatureNotEnabled("instrument_visa".to_string()));
    }
    let resource = config.resource.clone().ok_or_else(|| {
        DaqError::Configuration(format!("instrument '{id}' needs a VISA resource"))
    })?;
    let transport =
        VisaAdapter::new(resource).with_timeout(Duration::from_millis(config.timeout_ms));
    info!("Instrument '{id}' on {}", transport.info());
    Ok(transport)
}

fn build_osa(id: &str, config: &InstrumentConfig) -> AppResult<Box<dyn SpectrumAnalyzer>> {
    Ok(match config.kind {
        InstrumentKind::Mock => Box::new(MockSpectrumAnalyzer::optical(id)),
        InstrumentKind::Visa => {
            let transport = visa_transport(id, config)?;
            let mut osa = Aq6370Osa::new(id, Box::new(transport));
            if let Some(trace) = &config.trace {
                osa = osa.with_trace(trace);
            }
            Box::new(osa)
        }
    })
}

fn build_esa(id: &str, config: &InstrumentConfig) -> AppResult<Box<dyn SpectrumAnalyzer>> {
    Ok(match config.kind {
        InstrumentKind::Mock => Box::new(MockSpectrumAnalyzer::electrical(id)),
        InstrumentKind::Visa => {
            let transport = visa_transport(id, config)?;
            let mut esa = E4440aEsa::new(id, Box::new(transport));
            if let Some(trace) = &config.trace {
                esa = esa.with_trace(trace);
            }
            Box::new(esa)
        }
    })
}

fn build_laser(id: &str, config: &InstrumentConfig) -> AppResult<Box<dyn TunableLaser>> {
    Ok(match config.kind {
        InstrumentKind::Mock => Box::new(MockLaser::new(id)),
        InstrumentKind::Visa => {
            let transport = visa_transport(id, config)?;
            Box::new(Tlb6700Laser::new(id, Box::new(transport)))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_rejects_shape_mismatch() {
        let err = Trace::new(vec![1.0, 2.0], vec![0.0]).unwrap_err();
        assert!(err.to_string().contains("2 coordinates vs 1 values"));
    }

    #[test]
    fn test_trace_points_pair_axes() {
        let trace = Trace::new(vec![1.0, 2.0], vec![-10.0, -20.0]).unwrap();
        let points: Vec<[f64; 2]> = trace.points().collect();
        assert_eq!(points, vec![[1.0, -10.0], [2.0, -20.0]]);
        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn test_stream_file_indices() {
        assert_eq!(StreamId::Osa1.file_index(), 1);
        assert_eq!(StreamId::Osa2.file_index(), 2);
        assert_eq!(StreamId::Esa.file_index(), 3);
        assert_eq!(StreamId::Esa.coordinate_name(), "frequency");
    }

    #[tokio::test]
    async fn test_mock_suite_from_config() {
        let config = InstrumentsConfig::mock();
        let suite = InstrumentSuite::from_config(&config).await.unwrap();
        assert_eq!(
            suite.streams(),
            vec![StreamId::Osa1, StreamId::Osa2, StreamId::Esa]
        );
    }

    #[tokio::test]
    async fn test_disabled_esa_drops_stream() {
        let mut config = InstrumentsConfig::mock();
        config.esa.enabled = false;
        let suite = InstrumentSuite::from_config(&config).await.unwrap();
        assert_eq!(suite.streams(), vec![StreamId::Osa1, StreamId::Osa2]);
    }

    #[cfg(not(feature = "instrument_visa"))]
    #[tokio::test]
    async fn test_visa_instrument_requires_feature() {
        let mut config = InstrumentsConfig::mock();
        config.osa1.kind = InstrumentKind::Visa;
        config.osa1.resource = Some("GPIB0::4::INSTR".to_string());
        let result = InstrumentSuite::from_config(&config).await;
        assert!(matches!(result, Err(DaqError::FeatureNotEnabled(_))));
    }
}
