//! SCPI transport seam and response parsing.
//!
//! Drivers never touch VISA directly; they send command strings through an
//! [`ScpiTransport`]. Production code uses
//! [`VisaAdapter`](crate::adapters::VisaAdapter), tests use
//! [`MockAdapter`](crate::adapters::MockAdapter) with scripted responses.

use crate::error::{AppResult, DaqError};
use async_trait::async_trait;

/// Line-oriented SCPI command channel.
///
/// Commands are given without terminator; the transport appends its own.
#[async_trait]
pub trait ScpiTransport: Send + Sync {
    /// Sends `command` and returns the trimmed response line.
    async fn query(&self, command: &str) -> AppResult<String>;

    /// Sends `command` without reading a response.
    async fn write(&self, command: &str) -> AppResult<()>;

    /// Resource the transport is bound to (e.g. `GPIB0::4::INSTR`).
    fn resource(&self) -> &str;
}

/// Parses a comma-separated ASCII block such as `:TRACe:Y?` answers.
///
/// Empty fields (a trailing comma, surrounding whitespace) are skipped.
///
/// # Errors
///
/// Returns [`DaqError::Parse`] naming the first field that is not a number.
pub fn parse_ascii_values(response: &str) -> AppResult<Vec<f64>> {
    response
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| {
            field
                .parse::<f64>()
                .map_err(|_| DaqError::Parse(format!("'{field}' is not a number")))
        })
        .collect()
}

/// Parses a single numeric answer.
///
/// # Errors
///
/// Returns [`DaqError::Parse`] when the response is not exactly one number.
pub fn parse_scalar(response: &str) -> AppResult<f64> {
    let trimmed = response.trim();
    trimmed
        .parse::<f64>()
        .map_err(|_| DaqError::Parse(format!("expected a number, got '{trimmed}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ascii_values() {
        let values = parse_ascii_values("+1.59000000E-006,+1.59001000E-006, 1.5900200E-06\n").unwrap();
        assert_eq!(values.len(), 3);
        assert!((values[0] - 1.59e-6).abs() < 1e-18);
    }

    #[test]
    fn test_parse_ascii_values_skips_trailing_comma() {
        assert_eq!(parse_ascii_values("-70.1,-65.2,").unwrap(), vec![-70.1, -65.2]);
    }

    #[test]
    fn test_parse_ascii_values_reports_bad_field() {
        let err = parse_ascii_values("-70.1,abc").unwrap_err();
        assert!(err.to_string().contains("'abc'"));
    }

    #[test]
    fn test_parse_scalar() {
        assert_eq!(parse_scalar(" 1591.98\r\n").unwrap(), 1591.98);
        assert!(parse_scalar("1,2").is_err());
    }
}
