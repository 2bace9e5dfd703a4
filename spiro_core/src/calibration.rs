//! Flow calibration polynomials and the per-mouthpiece store.
//!
//! A polynomial maps |dp| (cmH2O) to flow magnitude (L/min). Tables are loaded
//! once at startup; a malformed or non-monotonic table aborts initialization.

use crate::error::CalibrationError;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Points probed across the domain when checking monotonicity.
const DOMAIN_PROBES: usize = 256;

/// Polynomial with coefficients ordered highest degree first.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationPolynomial {
    coefficients: Vec<f64>,
}

impl CalibrationPolynomial {
    pub fn new(coefficients: Vec<f64>) -> Result<Self, CalibrationError> {
        if coefficients.is_empty() {
            return Err(CalibrationError::InvalidCoefficients("no coefficients"));
        }
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(CalibrationError::InvalidCoefficients(
                "coefficients must be finite",
            ));
        }
        Ok(Self { coefficients })
    }

    #[inline]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    #[inline]
    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// Horner evaluation of P(x).
    #[inline]
    pub fn eval(&self, x: f64) -> f64 {
        self.coefficients.iter().fold(0.0, |acc, c| acc.mul_add(x, *c))
    }

    /// Require P to be finite and non-decreasing over `[0, max_dp]`.
    pub fn check_monotonic(&self, max_dp: f64) -> Result<(), String> {
        let mut prev = self.eval(0.0);
        if !prev.is_finite() {
            return Err("P(0) is not finite".to_string());
        }
        let scale = prev.abs().max(1.0);
        for i in 1..DOMAIN_PROBES {
            let x = max_dp * i as f64 / (DOMAIN_PROBES - 1) as f64;
            let y = self.eval(x);
            if !y.is_finite() {
                return Err(format!("P({x:.3}) is not finite"));
            }
            if y < prev - 1e-9 * scale {
                return Err(format!(
                    "non-monotonic domain: P decreases near |dp| = {x:.3} cmH2O"
                ));
            }
            prev = y;
        }
        Ok(())
    }
}

/// All loaded calibrations, keyed by lower-cased mouthpiece id.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    tables: BTreeMap<String, Arc<CalibrationPolynomial>>,
    max_dp_cmh2o: f64,
}

impl CalibrationStore {
    pub fn new(max_dp_cmh2o: f64) -> Self {
        Self {
            tables: BTreeMap::new(),
            max_dp_cmh2o,
        }
    }

    /// Validate and add one mouthpiece table.
    pub fn insert(
        &mut self,
        mouthpiece: &str,
        coefficients: Vec<f64>,
    ) -> Result<(), CalibrationError> {
        let malformed = |reason: String| CalibrationError::Malformed {
            mouthpiece: mouthpiece.to_string(),
            reason,
        };
        let poly = CalibrationPolynomial::new(coefficients).map_err(|e| malformed(e.to_string()))?;
        poly.check_monotonic(self.max_dp_cmh2o).map_err(malformed)?;
        self.tables
            .insert(mouthpiece.to_ascii_lowercase(), Arc::new(poly));
        Ok(())
    }

    pub fn get(&self, mouthpiece: &str) -> Result<Arc<CalibrationPolynomial>, CalibrationError> {
        self.tables
            .get(&mouthpiece.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| CalibrationError::UnknownMouthpiece {
                id: mouthpiece.to_string(),
                known: self.known(),
            })
    }

    pub fn contains(&self, mouthpiece: &str) -> bool {
        self.tables.contains_key(&mouthpiece.to_ascii_lowercase())
    }

    pub fn mouthpieces(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn known(&self) -> String {
        if self.tables.is_empty() {
            return "none".to_string();
        }
        self.mouthpieces().collect::<Vec<_>>().join(", ")
    }

    /// Load every configured table, then check the active mouthpiece exists.
    ///
    /// Relative table paths resolve against `base` (normally the config file's
    /// directory) unless `calibration.dir` overrides it.
    pub fn from_config(
        cfg: &spiro_config::CalibrationCfg,
        base: &Path,
    ) -> Result<Self, CalibrationError> {
        if cfg.tables.is_empty() {
            return Err(CalibrationError::Empty);
        }
        let mut store = Self::new(cfg.max_dp_cmh2o);
        for (id, rel) in &cfg.tables {
            let path = cfg.resolve(rel, base);
            let table = spiro_config::load_calibration_table(&path).map_err(|e| {
                CalibrationError::Malformed {
                    mouthpiece: id.clone(),
                    reason: format!("{e:#}"),
                }
            })?;
            store.insert(id, table.coefficients)?;
            tracing::debug!(mouthpiece = %id, path = %path.display(), "calibration loaded");
        }
        store.get(&cfg.mouthpiece)?;
        Ok(store)
    }
}
