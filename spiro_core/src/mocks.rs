//! Test and helper sensors for spiro_core.

/// A sensor that fails every read; drives cadences in tests without data.
pub struct NoopSensor;

impl spiro_traits::PressureSensor for NoopSensor {
    fn read(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<spiro_traits::PressureReading, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("noop sensor")))
    }
}
