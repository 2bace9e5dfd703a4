//! Replay of recorded sensor sessions.
//!
//! Recordings are tab-delimited with columns `time p1 p2 dp`; lines starting
//! with `#` are comments. The `dp` column is ignored because the monitor
//! recomputes it with its own zero offset. Playback loops at the end.
use crate::error::{HwError, Result};
use spiro_traits::{PressureReading, PressureSensor};
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ReplaySensor {
    times: Vec<f64>,
    readings: Vec<PressureReading>,
    cursor: usize,
}

impl ReplaySensor {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let sensor = Self::from_reader(file)?;
        tracing::debug!(path = %path.display(), samples = sensor.len(), "recording loaded");
        Ok(sensor)
    }

    pub fn from_reader<R: Read>(rdr: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(rdr);

        let mut times = Vec::new();
        let mut readings = Vec::new();
        for rec in rdr.records() {
            let rec = rec.map_err(|e| HwError::Parse {
                line: e.position().map_or(0, csv::Position::line),
                reason: e.to_string(),
            })?;
            let line = rec.position().map_or(0, csv::Position::line);
            if rec.len() < 3 {
                return Err(HwError::Parse {
                    line,
                    reason: format!("expected at least 3 columns, found {}", rec.len()),
                });
            }
            let field = |i: usize| -> Result<f64> {
                rec[i].parse::<f64>().map_err(|_| HwError::Parse {
                    line,
                    reason: format!("column {} is not a number: '{}'", i + 1, &rec[i]),
                })
            };
            times.push(field(0)?);
            readings.push(PressureReading::new(field(1)?, field(2)?));
        }

        if readings.is_empty() {
            return Err(HwError::EmptyRecording);
        }
        Ok(Self {
            times,
            readings,
            cursor: 0,
        })
    }

    /// Start playback `n` samples in (wraps around the recording length).
    pub fn with_start_offset(mut self, n: usize) -> Self {
        self.cursor = n % self.readings.len();
        self
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Mean sample rate implied by the time column.
    pub fn estimated_rate_hz(&self) -> Option<f64> {
        let (first, last) = (self.times.first()?, self.times.last()?);
        let span = last - first;
        if self.times.len() < 2 || !(span.is_finite() && span > 0.0) {
            return None;
        }
        Some((self.times.len() - 1) as f64 / span)
    }
}

impl PressureSensor for ReplaySensor {
    fn read(
        &mut self,
        _timeout: std::time::Duration,
    ) -> std::result::Result<PressureReading, Box<dyn std::error::Error + Send + Sync>> {
        let reading = self.readings[self.cursor];
        self.cursor += 1;
        if self.cursor >= self.readings.len() {
            tracing::trace!("recording wrapped");
            self.cursor = 0;
        }
        Ok(reading)
    }
}
