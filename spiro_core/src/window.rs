//! Samples of one breath, from inspiration start to the next one.

/// A breath window. Built while open, then frozen by [`BreathWindow::close`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BreathWindow {
    tsi: f64,
    tei: Option<f64>,
    tee: Option<f64>,
    time: Vec<f64>,
    pressure: Vec<f64>,
    flow: Vec<f64>,
    volume: Vec<f64>,
}

impl BreathWindow {
    /// Open at an inspiration start.
    pub fn open(tsi: f64) -> Self {
        Self {
            tsi,
            ..Self::default()
        }
    }

    pub fn push(&mut self, t: f64, pressure: f64, flow: f64, volume: f64) {
        self.time.push(t);
        self.pressure.push(pressure);
        self.flow.push(flow);
        self.volume.push(volume);
    }

    /// Record the end-of-inspiration marker. The first marker wins.
    pub fn mark_end_of_inspiration(&mut self, t: f64) {
        if self.tei.is_none() && t >= self.tsi {
            self.tei = Some(t);
        }
    }

    /// Close at the next inspiration start.
    #[must_use]
    pub fn close(mut self, tee: f64) -> Self {
        self.tee = Some(tee);
        self
    }

    #[inline]
    pub fn tsi(&self) -> f64 {
        self.tsi
    }

    #[inline]
    pub fn tei(&self) -> Option<f64> {
        self.tei
    }

    #[inline]
    pub fn tee(&self) -> Option<f64> {
        self.tee
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tee.is_some()
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn pressure(&self) -> &[f64] {
        &self.pressure
    }

    pub fn flow(&self) -> &[f64] {
        &self.flow
    }

    pub fn volume(&self) -> &[f64] {
        &self.volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_marker_wins_and_close_sets_tee() {
        let mut w = BreathWindow::open(1.0);
        w.mark_end_of_inspiration(0.5);
        assert_eq!(w.tei(), None);
        w.mark_end_of_inspiration(2.0);
        w.mark_end_of_inspiration(2.5);
        w.push(1.0, 5.0, 30.0, 0.0);
        let w = w.close(3.0);
        assert_eq!(w.tei(), Some(2.0));
        assert_eq!(w.tee(), Some(3.0));
        assert!(w.is_closed());
        assert_eq!(w.len(), 1);
    }
}
