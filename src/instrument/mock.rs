//! Synthetic instruments that generate plausible spectra.
//!
//! Used for `--mock` runs and in tests. Every mock is `Clone` and shares its
//! state between clones, so a test can keep a handle after boxing one into an
//! [`InstrumentSuite`](super::InstrumentSuite) and inject failures or inspect
//! the commands it received.

use super::{SpectrumAnalyzer, Trace, TunableLaser};
use crate::error::{AppResult, DaqError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Spectrum analyzer producing a Lorentzian line on a noise floor.
#[derive(Clone)]
pub struct MockSpectrumAnalyzer {
    name: String,
    start: f64,
    stop: f64,
    points: usize,
    center: f64,
    width: f64,
    floor_dbm: f64,
    peak_dbm: f64,
    sweeps: Arc<AtomicU64>,
    fail_next: Arc<AtomicUsize>,
}

impl MockSpectrumAnalyzer {
    /// An OSA view around 1592 nm.
    pub fn optical(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: 1590.0,
            stop: 1594.0,
            points: 501,
            center: 1591.98,
            width: 0.05,
            floor_dbm: -80.0,
            peak_dbm: -5.0,
            sweeps: Arc::new(AtomicU64::new(0)),
            fail_next: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// An ESA view from 0 to 1 GHz with a beat note at 250 MHz.
    pub fn electrical(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: 0.0,
            stop: 1.0e9,
            points: 601,
            center: 250.0e6,
            width: 2.0e6,
            floor_dbm: -90.0,
            peak_dbm: -30.0,
            sweeps: Arc::new(AtomicU64::new(0)),
            fail_next: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of points per trace.
    pub fn with_points(mut self, points: usize) -> Self {
        self.points = points;
        self
    }

    /// Makes the next `count` reads fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Successful reads so far.
    pub fn sweep_count(&self) -> u64 {
        self.sweeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpectrumAnalyzer for MockSpectrumAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_trace(&mut self) -> AppResult<Trace> {
        if take_failure(&self.fail_next) {
            return Err(DaqError::Instrument(format!("{}: injected read failure", self.name)));
        }

        let sweep = self.sweeps.fetch_add(1, Ordering::SeqCst) as f64;
        let coordinates = super::e4440a::linear_axis(self.start, self.stop, self.points);
        let span = self.peak_dbm - self.floor_dbm;
        let values = coordinates
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let detuning = (x - self.center) / self.width;
                let line_mw = 10f64.powf(span / 10.0) / (1.0 + detuning * detuning);
                // deterministic ripple instead of random noise
                let ripple = ((i as f64) * 0.37 + sweep * 1.3).sin() * 0.5;
                self.floor_dbm + 10.0 * (1.0 + line_mw).log10() + ripple
            })
            .collect();

        Trace::new(coordinates, values)
    }
}

/// Laser that records every piezo command it receives.
#[derive(Clone)]
pub struct MockLaser {
    name: String,
    enabled: Arc<AtomicBool>,
    positions: Arc<Mutex<Vec<f64>>>,
    fail_next: Arc<AtomicUsize>,
    fail_next_read: Arc<AtomicUsize>,
}

impl MockLaser {
    /// Base wavelength of the mock, nm.
    pub const BASE_WAVELENGTH_NM: f64 = 1591.98;
    /// Piezo tuning coefficient of the mock, nm per unit.
    pub const TUNING_NM_PER_UNIT: f64 = 0.001;

    /// A disabled laser with no recorded commands.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: Arc::new(AtomicBool::new(false)),
            positions: Arc::new(Mutex::new(Vec::new())),
            fail_next: Arc::new(AtomicUsize::new(0)),
            fail_next_read: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes the next `count` piezo commands fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` power or wavelength reads fail.
    pub fn fail_next_read(&self, count: usize) {
        self.fail_next_read.store(count, Ordering::SeqCst);
    }

    fn injected_read_failure(&self, what: &str) -> AppResult<()> {
        if take_failure(&self.fail_next_read) {
            return Err(DaqError::Instrument(format!(
                "{}: injected {what} read failure",
                self.name
            )));
        }
        Ok(())
    }

    /// Whether `enable` was called.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Every accepted piezo position, oldest first.
    pub fn commanded_positions(&self) -> Vec<f64> {
        self.positions
            .lock()
            .map(|positions| positions.clone())
            .unwrap_or_default()
    }

    fn last_position(&self) -> f64 {
        self.commanded_positions().last().copied().unwrap_or(0.0)
    }
}

#[async_trait]
impl TunableLaser for MockLaser {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enable(&mut self) -> AppResult<()> {
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn set_piezo(&mut self, position: f64) -> AppResult<()> {
        if take_failure(&self.fail_next) {
            return Err(DaqError::Instrument(format!(
                "{}: injected piezo failure",
                self.name
            )));
        }
        self.positions
            .lock()
            .map_err(|_| DaqError::Instrument(format!("{}: state poisoned", self.name)))?
            .push(position);
        Ok(())
    }

    async fn read_power(&mut self) -> AppResult<f64> {
        self.injected_read_failure("power")?;
        Ok(if self.is_enabled() { 12.5 } else { 0.0 })
    }

    async fn read_wavelength(&mut self) -> AppResult<f64> {
        self.injected_read_failure("wavelength")?;
        Ok(Self::BASE_WAVELENGTH_NM + self.last_position() * Self::TUNING_NM_PER_UNIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_optical_trace_peaks_at_center() {
        let mut osa = MockSpectrumAnalyzer::optical("osa1");
        let trace = osa.fetch_trace().await.unwrap();
        assert_eq!(trace.len(), 501);

        let (peak_index, _) = trace
            .values()
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        assert!((trace.coordinates()[peak_index] - 1591.98).abs() < 0.05);
        assert!(trace.values().iter().all(|&v| (-100.0..=10.0).contains(&v)));
    }

    #[tokio::test]
    async fn test_failure_injection_is_consumed() {
        let mut osa = MockSpectrumAnalyzer::electrical("esa").with_points(11);
        osa.fail_next(2);
        assert!(osa.fetch_trace().await.is_err());
        assert!(osa.fetch_trace().await.is_err());
        assert_eq!(osa.fetch_trace().await.unwrap().len(), 11);
        assert_eq!(osa.sweep_count(), 1);
    }

    #[tokio::test]
    async fn test_laser_records_positions_across_clones() {
        let handle = MockLaser::new("laser");
        let mut laser = handle.clone();
        laser.enable().await.unwrap();
        laser.set_piezo(0.1).await.unwrap();
        laser.set_piezo(0.2).await.unwrap();

        assert!(handle.is_enabled());
        assert_eq!(handle.commanded_positions(), vec![0.1, 0.2]);
        let wl = laser.read_wavelength().await.unwrap();
        assert!((wl - (1591.98 + 0.0002)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_laser_failure_not_recorded() {
        let handle = MockLaser::new("laser");
        let mut laser = handle.clone();
        handle.fail_next(1);
        assert!(laser.set_piezo(1.0).await.is_err());
        laser.set_piezo(2.0).await.unwrap();
        assert_eq!(handle.commanded_positions(), vec![2.0]);
    }

    #[tokio::test]
    async fn test_laser_read_failure_is_consumed() {
        let handle = MockLaser::new("laser");
        let mut laser = handle.clone();
        handle.fail_next_read(1);
        assert!(laser.read_power().await.is_err());
        assert!(laser.read_wavelength().await.is_ok());
        assert!(laser.read_power().await.is_ok());
    }
}
