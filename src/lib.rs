//! Core library for the coupling_daq application.
//!
//! Drives a polarized-coupling measurement: two optical spectrum analyzers,
//! an optional electrical spectrum analyzer and a tunable laser are polled in
//! a loop while the laser piezo is stepped. Whenever the accumulated piezo
//! displacement lands on a multiple of the recording step, the traces of that
//! iteration are appended to CSV files tagged with a monotonically increasing
//! file id.
//!
//! - [`scan`]: session state, trigger predicate and the controller task
//! - [`instrument`]: instrument traits, SCPI drivers and mock instruments
//! - [`adapters`]: SCPI transports (VISA, scripted mock)
//! - [`storage`]: checkpoint CSV writer
//! - [`display`]: snapshots published to the front ends
//! - [`console`]: headless stdin operator console
//! - `gui`: egui dashboard (feature `gui`)

pub mod adapters;
pub mod config;
pub mod console;
pub mod display;
pub mod error;
#[cfg(feature = "gui")]
pub mod gui;
pub mod instrument;
pub mod logging;
pub mod scan;
pub mod storage;
