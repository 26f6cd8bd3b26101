//! SCPI transport implementations
//!
//! This module contains implementations of the
//! [`ScpiTransport`](crate::instrument::scpi::ScpiTransport) trait, providing
//! low-level I/O for the instrument drivers.

pub mod mock;
pub mod visa_adapter;

pub use mock::MockAdapter;
pub use visa_adapter::VisaAdapter;
