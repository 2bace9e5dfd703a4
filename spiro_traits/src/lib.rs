//! Collaborator seams for the respiratory monitor.
//!
//! The pipeline only ever sees a `PressureSensor` and a `Clock`; drivers,
//! simulators and recordings live behind these traits.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// One pair of gauge readings in cmH2O, taken across the flow restriction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureReading {
    /// Airway-side pressure.
    pub p1: f64,
    /// Pressure on the far side of the restriction.
    pub p2: f64,
}

impl PressureReading {
    #[inline]
    pub fn new(p1: f64, p2: f64) -> Self {
        Self { p1, p2 }
    }

    /// Raw differential pressure `p2 - p1` (no zero offset applied).
    #[inline]
    pub fn dp(&self) -> f64 {
        self.p2 - self.p1
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.p1.is_finite() && self.p2.is_finite()
    }
}

pub trait PressureSensor {
    /// Block for at most `timeout` and return one reading.
    fn read(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<PressureReading, Box<dyn std::error::Error + Send + Sync>>;

    /// Re-zero the gauges against ambient. Sensors without a hardware zero keep the default.
    fn rezero(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

impl<S: PressureSensor + ?Sized> PressureSensor for Box<S> {
    fn read(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<PressureReading, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read(timeout)
    }

    fn rezero(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).rezero()
    }
}
