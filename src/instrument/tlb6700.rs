//! New Focus TLB-6700 (Velocity) tunable laser controller.

use super::{
    scpi::{parse_scalar, ScpiTransport},
    TunableLaser,
};
use crate::error::AppResult;
use async_trait::async_trait;
use tracing::debug;

/// TLB-6700 driver. The piezo position is given in percent of travel.
pub struct Tlb6700Laser {
    name: String,
    transport: Box<dyn ScpiTransport>,
}

impl Tlb6700Laser {
    /// Wraps a transport bound to the controller.
    pub fn new(name: &str, transport: Box<dyn ScpiTransport>) -> Self {
        Self {
            name: name.to_string(),
            transport,
        }
    }
}

#[async_trait]
impl TunableLaser for Tlb6700Laser {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enable(&mut self) -> AppResult<()> {
        self.transport.write("OUTPut:STATe 1").await
    }

    async fn set_piezo(&mut self, position: f64) -> AppResult<()> {
        debug!("{}: piezo -> {position:.2}", self.name);
        self.transport
            .write(&format!("SOURce:VOLTage:PIEZo {position:.2}"))
            .await
    }

    async fn read_power(&mut self) -> AppResult<f64> {
        parse_scalar(&self.transport.query("SENSe:POWer:DIODe?").await?)
    }

    async fn read_wavelength(&mut self) -> AppResult<f64> {
        parse_scalar(&self.transport.query("SENSe:WAVElength?").await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;

    #[tokio::test]
    async fn test_commands() {
        let adapter = MockAdapter::new("USB0::0x104D::0x100A::INSTR")
            .with_response("SENSe:POWer:DIODe?", "12.50")
            .with_response("SENSe:WAVElength?", "1591.980");
        let mut laser = Tlb6700Laser::new("laser", Box::new(adapter.clone()));

        laser.enable().await.unwrap();
        laser.set_piezo(12.3).await.unwrap();
        assert_eq!(laser.read_power().await.unwrap(), 12.5);
        assert_eq!(laser.read_wavelength().await.unwrap(), 1591.98);

        assert_eq!(
            adapter.call_log(),
            vec![
                "write: OUTPut:STATe 1",
                "write: SOURce:VOLTage:PIEZo 12.30",
                "query: SENSe:POWer:DIODe?",
                "query: SENSe:WAVElength?",
            ]
        );
    }
}
