//! Batch peak finding on buffered traces.
//!
//! Candidate local maxima (flat tops resolve to their midpoint) are filtered
//! in order by height, distance, prominence and width. Distance keeps the
//! tallest peak of any cluster. Width is measured at half prominence with
//! linear interpolation between samples.

use crate::config::PeakCfg;

/// Peak thresholds in samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakParams {
    pub min_height: Option<f64>,
    /// Minimum index gap between kept peaks (values <= 1 disable the filter).
    pub min_distance: usize,
    pub min_prominence: Option<f64>,
    pub min_width: Option<f64>,
}

impl Default for PeakParams {
    fn default() -> Self {
        Self {
            min_height: None,
            min_distance: 1,
            min_prominence: None,
            min_width: None,
        }
    }
}

impl PeakParams {
    /// Convert second-based thresholds at `sample_rate_hz`.
    pub fn from_cfg(cfg: &PeakCfg, sample_rate_hz: f64) -> Self {
        let distance = (cfg.min_distance_s * sample_rate_hz).ceil();
        Self {
            min_height: cfg.min_height,
            min_distance: if distance.is_finite() && distance > 1.0 {
                distance as usize
            } else {
                1
            },
            min_prominence: cfg.min_prominence,
            min_width: cfg.min_width_s.map(|w| w * sample_rate_hz),
        }
    }
}

/// Indices of peaks in `x` that pass every configured threshold, ascending.
pub fn find_peaks(x: &[f64], params: &PeakParams) -> Vec<usize> {
    let mut peaks = local_maxima(x);

    if let Some(h) = params.min_height {
        peaks.retain(|&p| x[p] >= h);
    }
    if params.min_distance > 1 {
        peaks = select_by_distance(&peaks, x, params.min_distance);
    }
    if params.min_prominence.is_none() && params.min_width.is_none() {
        return peaks;
    }

    peaks
        .into_iter()
        .filter(|&p| {
            let prom = prominence(x, p);
            if let Some(min) = params.min_prominence
                && prom.value < min
            {
                return false;
            }
            if let Some(min) = params.min_width
                && width_at_half_prominence(x, p, &prom) < min
            {
                return false;
            }
            true
        })
        .collect()
}

/// Minima of a volume trace: peaks of the negated trace.
pub fn volume_minima(volume: &[f64], params: &PeakParams) -> Vec<usize> {
    let negated: Vec<f64> = volume.iter().map(|v| -v).collect();
    find_peaks(&negated, params)
}

fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    let n = x.len();
    if n < 3 {
        return peaks;
    }
    let last = n - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

fn select_by_distance(peaks: &[usize], x: &[f64], distance: usize) -> Vec<usize> {
    let n = peaks.len();
    let mut keep = vec![true; n];
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));

    for &i in order.iter().rev() {
        if !keep[i] {
            continue;
        }
        let mut j = i;
        while j > 0 && peaks[i] - peaks[j - 1] < distance {
            keep[j - 1] = false;
            j -= 1;
        }
        let mut j = i + 1;
        while j < n && peaks[j] - peaks[i] < distance {
            keep[j] = false;
            j += 1;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Prominence {
    value: f64,
    left_base: usize,
    right_base: usize,
}

fn prominence(x: &[f64], peak: usize) -> Prominence {
    let top = x[peak];

    let mut left_min = top;
    let mut left_base = peak;
    let mut i = peak;
    while i > 0 {
        i -= 1;
        if x[i] > top {
            break;
        }
        if x[i] < left_min {
            left_min = x[i];
            left_base = i;
        }
    }

    let mut right_min = top;
    let mut right_base = peak;
    for (j, &v) in x.iter().enumerate().skip(peak + 1) {
        if v > top {
            break;
        }
        if v < right_min {
            right_min = v;
            right_base = j;
        }
    }

    Prominence {
        value: top - left_min.max(right_min),
        left_base,
        right_base,
    }
}

fn width_at_half_prominence(x: &[f64], peak: usize, prom: &Prominence) -> f64 {
    let height = x[peak] - 0.5 * prom.value;

    let mut i = peak;
    while prom.left_base < i && height < x[i] {
        i -= 1;
    }
    let mut left = i as f64;
    if x[i] < height {
        left += (height - x[i]) / (x[i + 1] - x[i]);
    }

    let mut i = peak;
    while i < prom.right_base && height < x[i] {
        i += 1;
    }
    let mut right = i as f64;
    if x[i] < height {
        right -= (height - x[i]) / (x[i - 1] - x[i]);
    }

    right - left
}
