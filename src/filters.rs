//! Rolling filters applied to plotted series: spike removal and smoothing.
//!
//! All filters take `Option<f64>` samples; `None` entries are skipped inside a
//! window and a window with no values yields `None`.

pub const SPIKE_WINDOW_RANGE: (usize, usize) = (1, 50);
pub const SMOOTHING_WINDOW_RANGE: (usize, usize) = (1, 1000);
pub const DEFAULT_SPIKE_WINDOW: usize = 3;
pub const DEFAULT_SMOOTHING_WINDOW: usize = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Smoothing {
    #[default]
    None,
    /// Trailing simple moving average.
    Sma,
    /// Exponential moving average with `alpha = 2 / (window + 1)`.
    Ema,
}

impl Smoothing {
    pub fn next(self) -> Self {
        match self {
            Smoothing::None => Smoothing::Sma,
            Smoothing::Sma => Smoothing::Ema,
            Smoothing::Ema => Smoothing::None,
        }
    }

    pub fn label_key(self) -> &'static str {
        match self {
            Smoothing::None => "plot.smoothing_none",
            Smoothing::Sma => "plot.smoothing_sma",
            Smoothing::Ema => "plot.smoothing_ema",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterSettings {
    pub spike_removal: bool,
    pub spike_window: usize,
    pub smoothing: Smoothing,
    pub smoothing_window: usize,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            spike_removal: false,
            spike_window: DEFAULT_SPIKE_WINDOW,
            smoothing: Smoothing::None,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
        }
    }
}

impl FilterSettings {
    pub fn with_spike_window(mut self, window: usize) -> Self {
        self.spike_window = window.clamp(SPIKE_WINDOW_RANGE.0, SPIKE_WINDOW_RANGE.1);
        self
    }

    pub fn with_smoothing_window(mut self, window: usize) -> Self {
        self.smoothing_window = window.clamp(SMOOTHING_WINDOW_RANGE.0, SMOOTHING_WINDOW_RANGE.1);
        self
    }

    /// Step the spike window by `delta`, staying inside its range.
    pub fn adjust_spike_window(&mut self, delta: i64) {
        let next = (self.spike_window as i64 + delta)
            .clamp(SPIKE_WINDOW_RANGE.0 as i64, SPIKE_WINDOW_RANGE.1 as i64);
        self.spike_window = next as usize;
    }

    pub fn adjust_smoothing_window(&mut self, delta: i64) {
        let next = (self.smoothing_window as i64 + delta)
            .clamp(SMOOTHING_WINDOW_RANGE.0 as i64, SMOOTHING_WINDOW_RANGE.1 as i64);
        self.smoothing_window = next as usize;
    }

    /// True when applying these settings leaves any series unchanged.
    pub fn is_identity(&self) -> bool {
        !self.spike_removal && self.smoothing == Smoothing::None
    }

    /// Spike removal first, then the selected smoothing.
    pub fn apply(&self, data: &[Option<f64>]) -> Vec<Option<f64>> {
        let despiked = if self.spike_removal {
            rolling_median_centered(data, self.spike_window)
        } else {
            data.to_vec()
        };
        match self.smoothing {
            Smoothing::None => despiked,
            Smoothing::Sma => simple_moving_average(&despiked, self.smoothing_window),
            Smoothing::Ema => exponential_moving_average(&despiked, self.smoothing_window),
        }
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Centered rolling median. The window for sample `i` spans
/// `[i - k/2, i + (k-1)/2]` (integer division) clipped to the data.
pub fn rolling_median_centered(data: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    let after = (window - 1) / 2;
    let before = window - 1 - after;
    let mut scratch = Vec::with_capacity(window);
    (0..data.len())
        .map(|i| {
            let start = i.saturating_sub(before);
            let end = (i + after + 1).min(data.len());
            scratch.clear();
            scratch.extend(data[start..end].iter().flatten().copied());
            median(&mut scratch)
        })
        .collect()
}

/// Trailing rolling mean over the last `window` samples.
pub fn simple_moving_average(data: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    let mut sum = 0.0;
    let mut count = 0usize;
    let mut out = Vec::with_capacity(data.len());
    for i in 0..data.len() {
        if let Some(v) = data[i] {
            sum += v;
            count += 1;
        }
        if i >= window {
            if let Some(old) = data[i - window] {
                sum -= old;
                count -= 1;
            }
        }
        out.push(if count > 0 {
            Some(sum / count as f64)
        } else {
            None
        });
    }
    out
}

/// Exponential moving average seeded with the first observed value.
/// The previous average's weight decays on every step, gaps included, and
/// a gap repeats the running average. Leading gaps stay `None`.
pub fn exponential_moving_average(data: &[Option<f64>], span: usize) -> Vec<Option<f64>> {
    let alpha = 2.0 / (span.max(1) as f64 + 1.0);
    let mut state: Option<f64> = None;
    let mut old_weight = 1.0;
    data.iter()
        .map(|sample| {
            let Some(prev) = state else {
                state = *sample;
                return state;
            };
            old_weight *= 1.0 - alpha;
            if let Some(v) = *sample {
                state = Some((old_weight * prev + alpha * v) / (old_weight + alpha));
                old_weight = 1.0;
            }
            state
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    fn assert_close(actual: &[Option<f64>], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            let a = a.expect("value present");
            assert!((a - e).abs() < 1e-9, "{} != {}", a, e);
        }
    }

    #[test]
    fn test_median_removes_single_spike() {
        let data = some(&[1.0, 1.0, 100.0, 1.0, 1.0]);
        assert_close(&rolling_median_centered(&data, 3), &[1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_median_edges_use_partial_windows() {
        let data = some(&[5.0, 1.0, 3.0]);
        // Edges hold two samples, so their median is a mean.
        assert_close(&rolling_median_centered(&data, 3), &[3.0, 3.0, 2.0]);
    }

    #[test]
    fn test_median_even_window_leans_back() {
        let data = some(&[1.0, 2.0, 3.0, 4.0]);
        // window 4 covers [i-2, i+1]
        assert_close(&rolling_median_centered(&data, 4), &[1.5, 2.0, 2.5, 3.0]);
    }

    #[test]
    fn test_median_window_one_is_identity() {
        let data = vec![Some(3.0), None, Some(7.0)];
        assert_eq!(rolling_median_centered(&data, 1), data);
    }

    #[test]
    fn test_sma_trailing_with_min_periods() {
        let data = some(&[2.0, 4.0, 6.0, 8.0]);
        assert_close(&simple_moving_average(&data, 2), &[2.0, 3.0, 5.0, 7.0]);
        assert_close(&simple_moving_average(&data, 10), &[2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_sma_skips_missing() {
        let data = vec![Some(2.0), None, Some(4.0)];
        let out = simple_moving_average(&data, 2);
        assert_eq!(out, vec![Some(2.0), Some(2.0), Some(4.0)]);
    }

    #[test]
    fn test_ema_matches_recursive_definition() {
        let data = some(&[10.0, 20.0, 30.0]);
        // span 3 => alpha 0.5
        assert_close(&exponential_moving_average(&data, 3), &[10.0, 15.0, 22.5]);
    }

    #[test]
    fn test_ema_decays_weight_across_missing() {
        let data = vec![Some(10.0), None, Some(20.0)];
        // previous weight (1 - 0.5)^2 against 0.5 for the new sample
        let out = exponential_moving_average(&data, 3);
        assert_close(&out, &[10.0, 10.0, 50.0 / 3.0]);
    }

    #[test]
    fn test_ema_leading_missing_stays_empty() {
        let data = vec![None, Some(4.0), Some(8.0)];
        let out = exponential_moving_average(&data, 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], Some(4.0));
        assert_eq!(out[2], Some(6.0));
    }

    #[test]
    fn test_settings_default_is_identity() {
        let settings = FilterSettings::default();
        assert!(settings.is_identity());
        let data = vec![Some(1.0), None, Some(9.0)];
        assert_eq!(settings.apply(&data), data);
    }

    #[test]
    fn test_settings_apply_spike_then_smoothing() {
        let settings = FilterSettings {
            spike_removal: true,
            spike_window: 3,
            smoothing: Smoothing::Sma,
            smoothing_window: 2,
        };
        let data = some(&[1.0, 1.0, 100.0, 1.0, 1.0]);
        assert_close(&settings.apply(&data), &[1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_window_adjustments_are_clamped() {
        let mut settings = FilterSettings::default();
        settings.adjust_spike_window(-10);
        assert_eq!(settings.spike_window, 1);
        settings.adjust_spike_window(100);
        assert_eq!(settings.spike_window, 50);
        settings.adjust_smoothing_window(5000);
        assert_eq!(settings.smoothing_window, 1000);
        assert_eq!(FilterSettings::default().with_smoothing_window(0).smoothing_window, 1);
    }

    #[test]
    fn test_smoothing_cycles() {
        assert_eq!(Smoothing::None.next(), Smoothing::Sma);
        assert_eq!(Smoothing::Ema.next(), Smoothing::None);
    }
}
