//! Deterministic synthetic breather.
//!
//! Each read advances simulated time by one sample period, so the produced
//! waveform does not depend on wall-clock pacing.
use crate::error::HwError;
use spiro_traits::{PressureReading, PressureSensor};
use std::f64::consts::PI;

/// Shape of the simulated breathing cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreathPattern {
    pub rr_bpm: f64,
    /// Expiratory over inspiratory duration.
    pub ie_ratio: f64,
    /// Peak inspiratory differential pressure, cmH2O.
    pub peak_dp_cmh2o: f64,
    pub pip_cmh2o: f64,
    pub peep_cmh2o: f64,
    /// Constant offset added to dp (sensor bias).
    pub bias_dp_cmh2o: f64,
    /// Uniform noise amplitude added to both gauges.
    pub noise_cmh2o: f64,
}

impl Default for BreathPattern {
    fn default() -> Self {
        Self {
            rr_bpm: 15.0,
            ie_ratio: 2.0,
            peak_dp_cmh2o: 1.0,
            pip_cmh2o: 20.0,
            peep_cmh2o: 5.0,
            bias_dp_cmh2o: 0.0,
            noise_cmh2o: 0.0,
        }
    }
}

impl BreathPattern {
    pub fn period_s(&self) -> f64 {
        60.0 / self.rr_bpm.max(f64::MIN_POSITIVE)
    }

    pub fn inspiratory_s(&self) -> f64 {
        self.period_s() / (1.0 + self.ie_ratio.max(0.0))
    }

    /// Noise-free (dp, airway pressure) at time `t`.
    pub fn clean_at(&self, t: f64) -> (f64, f64) {
        let period = self.period_s();
        let ti = self.inspiratory_s();
        let te = (period - ti).max(f64::MIN_POSITIVE);
        let tau = t.rem_euclid(period);
        let span = self.pip_cmh2o - self.peep_cmh2o;
        if tau < ti {
            let dp = self.peak_dp_cmh2o * (PI * tau / ti).sin();
            let paw = self.peep_cmh2o + span * 0.5 * (1.0 - (PI * tau / ti).cos());
            (dp, paw)
        } else {
            let into = tau - ti;
            // Shorter inspiration drives a proportionally weaker expiration.
            let amp = self.peak_dp_cmh2o * (ti / te).sqrt();
            let dp = -amp * (PI * into / te).sin();
            let paw = self.peep_cmh2o + span * (-into / 0.2).exp();
            (dp, paw)
        }
    }
}

/// Tiny xorshift generator; deterministic per seed.
#[derive(Debug, Clone)]
struct XorShift32(u32);

impl XorShift32 {
    fn next_unit(&mut self) -> f64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        f64::from(x) / (f64::from(u32::MAX) + 1.0)
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedBreather {
    pattern: BreathPattern,
    dt: f64,
    t: f64,
    reads: u64,
    rng: XorShift32,
    fail_every: Option<u32>,
    always_timeout: bool,
}

impl SimulatedBreather {
    pub fn new(pattern: BreathPattern, sample_rate_hz: u32, seed: u32) -> Self {
        Self {
            pattern,
            dt: 1.0 / f64::from(sample_rate_hz.max(1)),
            t: 0.0,
            reads: 0,
            rng: XorShift32(seed.max(1)),
            fail_every: None,
            always_timeout: false,
        }
    }

    /// Fail every `n`-th read with a sensor fault (`n >= 1`).
    pub fn with_fail_every(mut self, n: u32) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// Make every read time out.
    pub fn with_always_timeout(mut self, on: bool) -> Self {
        self.always_timeout = on;
        self
    }

    /// Hold both gauges at ambient with no flow for the first `secs` seconds.
    pub fn with_quiet_lead_in(mut self, secs: f64) -> Self {
        self.t = -secs.max(0.0);
        self
    }

    pub fn pattern(&self) -> &BreathPattern {
        &self.pattern
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    fn noise(&mut self) -> f64 {
        if self.pattern.noise_cmh2o == 0.0 {
            return 0.0;
        }
        (self.rng.next_unit() * 2.0 - 1.0) * self.pattern.noise_cmh2o
    }

    fn next_reading(&mut self) -> Result<PressureReading, HwError> {
        self.reads += 1;
        let t = self.t;
        self.t += self.dt;

        if self.always_timeout {
            return Err(HwError::Timeout);
        }
        if let Some(n) = self.fail_every
            && self.reads % u64::from(n) == 0
        {
            return Err(HwError::Fault(format!("injected fault at read {}", self.reads)));
        }

        let (dp, paw) = if t < 0.0 {
            (0.0, 0.0)
        } else {
            self.pattern.clean_at(t)
        };
        let p1 = paw + self.noise();
        let p2 = paw + dp + self.pattern.bias_dp_cmh2o + self.noise();
        Ok(PressureReading::new(p1, p2))
    }
}

impl PressureSensor for SimulatedBreather {
    fn read(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<PressureReading, Box<dyn std::error::Error + Send + Sync>> {
        self.next_reading().map_err(|e| {
            tracing::trace!(error = %e, "simulated read failed");
            Box::new(e) as Box<dyn std::error::Error + Send + Sync>
        })
    }
}
