//! Sliding-window helpers over 1-D column profiles.

/// Population statistics of one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub variance: f64,
    pub max: f64,
    pub min: f64,
}

impl WindowStats {
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                mean: 0.0,
                variance: 0.0,
                max: 0.0,
                min: 0.0,
            };
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);

        Self {
            mean,
            variance,
            max,
            min,
        }
    }

    pub fn stddev(&self) -> f64 {
        self.variance.sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Min,
    Max,
}

/// Best window found by [`scan`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowHit {
    pub start: u32,
    pub center: u32,
    pub score: f64,
}

/// Slide a `window`-wide window over every start in `band` that keeps the
/// window inside the band, and keep the best score.
///
/// Comparison is strict, so the first (lowest x) extremum wins ties. Returns
/// `None` when no window fits.
pub fn scan<F>(
    profile: &[f64],
    band: (u32, u32),
    window: u32,
    step: u32,
    extremum: Extremum,
    mut score: F,
) -> Option<WindowHit>
where
    F: FnMut(u32, &[f64]) -> f64,
{
    let (band_start, band_end) = band;
    let band_end = band_end.min(profile.len() as u32);
    if window == 0 || band_end < band_start || band_end - band_start < window {
        return None;
    }

    let mut best: Option<WindowHit> = None;
    for start in (band_start..=band_end - window).step_by(step.max(1) as usize) {
        let values = &profile[start as usize..(start + window) as usize];
        let value = score(start, values);

        let better = match best {
            None => true,
            Some(hit) => match extremum {
                Extremum::Min => value < hit.score,
                Extremum::Max => value > hit.score,
            },
        };
        if better {
            best = Some(WindowHit {
                start,
                center: start + window / 2,
                score: value,
            });
        }
    }
    best
}

/// Mean of `profile[start..end]`, clamped to the profile. Empty ranges give 0.
pub fn range_mean(profile: &[f64], start: i64, end: i64) -> f64 {
    let len = profile.len() as i64;
    let start = start.clamp(0, len) as usize;
    let end = end.clamp(0, len) as usize;
    if end <= start {
        return 0.0;
    }
    profile[start..end].iter().sum::<f64>() / (end - start) as f64
}

/// Median; the mean of the two middle values for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
