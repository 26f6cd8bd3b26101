//! Readings of one loop iteration.

use crate::{
    error::{AppResult, DaqError},
    instrument::{InstrumentSuite, StreamId, Trace},
};

/// Everything read from the bench in one iteration.
///
/// Each reading is kept as a `Result` so one failing instrument does not
/// hide the others on the dashboard.
#[derive(Debug)]
pub struct SampleBundle {
    /// OSA1 trace.
    pub osa1: AppResult<Trace>,
    /// OSA2 trace.
    pub osa2: AppResult<Trace>,
    /// ESA trace, `None` when the ESA is disabled.
    pub esa: Option<AppResult<Trace>>,
    /// Laser output power.
    pub laser_power: AppResult<f64>,
    /// Laser wavelength.
    pub laser_wavelength: AppResult<f64>,
}

impl SampleBundle {
    /// Polls every instrument once, in order: OSA1, OSA2, ESA, laser.
    pub async fn acquire(suite: &mut InstrumentSuite) -> Self {
        let osa1 = suite.osa1.fetch_trace().await;
        let osa2 = suite.osa2.fetch_trace().await;
        let esa = match suite.esa.as_mut() {
            Some(esa) => Some(esa.fetch_trace().await),
            None => None,
        };
        let laser_power = suite.laser.read_power().await;
        let laser_wavelength = suite.laser.read_wavelength().await;

        Self {
            osa1,
            osa2,
            esa,
            laser_power,
            laser_wavelength,
        }
    }

    /// Spectrum results in file-index order.
    pub fn spectra(&self) -> Vec<(StreamId, &AppResult<Trace>)> {
        let mut spectra = vec![(StreamId::Osa1, &self.osa1), (StreamId::Osa2, &self.osa2)];
        if let Some(esa) = &self.esa {
            spectra.push((StreamId::Esa, esa));
        }
        spectra
    }

    /// Every trace to checkpoint, or `None` if any reading of this
    /// iteration failed, laser readbacks included.
    pub fn checkpoint_streams(&self) -> Option<Vec<(StreamId, &Trace)>> {
        if self.laser_power.is_err() || self.laser_wavelength.is_err() {
            return None;
        }
        self.spectra()
            .into_iter()
            .map(|(stream, result)| result.as_ref().ok().map(|trace| (stream, trace)))
            .collect()
    }

    /// Names of the readings that failed, in polling order.
    pub fn failed_readings(&self) -> Vec<&'static str> {
        self.failures().into_iter().map(|(what, _)| what).collect()
    }

    /// Every failed reading with the name of what was read.
    pub fn failures(&self) -> Vec<(&'static str, &DaqError)> {
        let mut failures: Vec<(&'static str, &DaqError)> = self
            .spectra()
            .into_iter()
            .filter_map(|(stream, result)| result.as_ref().err().map(|e| (stream.label(), e)))
            .collect();
        if let Err(e) = &self.laser_power {
            failures.push(("laser power", e));
        }
        if let Err(e) = &self.laser_wavelength {
            failures.push(("laser wavelength", e));
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{MockLaser, MockSpectrumAnalyzer};

    fn suite(esa: Option<MockSpectrumAnalyzer>) -> (InstrumentSuite, MockSpectrumAnalyzer) {
        let osa2 = MockSpectrumAnalyzer::optical("osa2").with_points(5);
        let suite = InstrumentSuite {
            osa1: Box::new(MockSpectrumAnalyzer::optical("osa1").with_points(5)),
            osa2: Box::new(osa2.clone()),
            esa: esa.map(|esa| Box::new(esa) as Box<dyn crate::instrument::SpectrumAnalyzer>),
            laser: Box::new(MockLaser::new("laser")),
        };
        (suite, osa2)
    }

    #[tokio::test]
    async fn test_all_streams_available() {
        let (mut suite, _) = suite(Some(MockSpectrumAnalyzer::electrical("esa").with_points(5)));
        let bundle = SampleBundle::acquire(&mut suite).await;

        let streams = bundle.checkpoint_streams().unwrap();
        let ids: Vec<StreamId> = streams.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![StreamId::Osa1, StreamId::Osa2, StreamId::Esa]);
        assert!(bundle.failures().is_empty());
    }

    #[tokio::test]
    async fn test_one_failed_stream_blocks_checkpoint() {
        let (mut suite, osa2) = suite(None);
        osa2.fail_next(1);
        let bundle = SampleBundle::acquire(&mut suite).await;

        assert!(bundle.osa1.is_ok());
        assert!(bundle.checkpoint_streams().is_none());
        assert_eq!(bundle.failed_readings(), vec!["OSA2"]);
    }

    #[tokio::test]
    async fn test_laser_readback_failure_blocks_checkpoint() {
        let laser = MockLaser::new("laser");
        let mut suite = InstrumentSuite {
            osa1: Box::new(MockSpectrumAnalyzer::optical("osa1").with_points(5)),
            osa2: Box::new(MockSpectrumAnalyzer::optical("osa2").with_points(5)),
            esa: None,
            laser: Box::new(laser.clone()),
        };
        laser.fail_next_read(2);
        let bundle = SampleBundle::acquire(&mut suite).await;

        assert!(bundle.osa1.is_ok() && bundle.osa2.is_ok());
        assert!(bundle.checkpoint_streams().is_none());
        assert_eq!(
            bundle.failed_readings(),
            vec!["laser power", "laser wavelength"]
        );
    }
}
