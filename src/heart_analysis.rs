use crate::config::AnalysisConfig;
use crate::TimeBase;
use log::{debug, trace};
use serde::Serialize;
use std::cmp::Ordering;

/// BPM values derived from a beat set, aligned to every beat but the first
#[derive(Debug, Clone, PartialEq)]
pub struct BpmSeries {
    /// Sample index of the later beat of each interval
    pub beat_indices: Vec<usize>,
    pub times_hours: Vec<f64>,
    pub intervals_seconds: Vec<f64>,
    pub instantaneous: Vec<f64>,
    /// Trailing rolling mean of `instantaneous`, undefined while the window fills
    pub smoothed: Vec<Option<f64>>,
    /// `smoothed` after gap interpolation
    pub filled: Vec<Option<f64>>,
    /// Position of the first interval longer than the gap threshold
    pub first_gap: Option<usize>,
}

impl BpmSeries {
    pub fn len(&self) -> usize {
        self.instantaneous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instantaneous.is_empty()
    }
}

/// Per-subject scalar outcomes, all times in hours from the start of the trace
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Events {
    /// First beat after the first gap longer than the threshold
    pub death_time_hours: Option<f64>,
    /// Last beat before that gap
    pub last_beat_hours: Option<f64>,
    /// Time of the highest gap-filled smoothed BPM
    pub topt_hours: Option<f64>,
    pub max_smoothed_bpm: Option<f64>,
}

/// Local maxima of `data`, thinned so that no two are closer than `distance`
/// samples. Plateaus report their (left-rounded) midpoint; the first and last
/// samples never count. When two maxima are too close the taller one wins.
pub fn find_peaks(data: &[f64], distance: usize) -> Vec<usize> {
    let peaks = local_maxima(data);
    if distance <= 1 || peaks.len() < 2 {
        return peaks;
    }
    select_by_distance(&peaks, data, distance)
}

fn local_maxima(data: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if data.len() < 3 {
        return peaks;
    }

    let last = data.len() - 1;
    let mut i = 1;
    while i < last {
        if data[i - 1] < data[i] {
            let mut ahead = i + 1;
            while ahead < last && data[ahead] == data[i] {
                ahead += 1;
            }
            if data[ahead] < data[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }

    peaks
}

fn select_by_distance(peaks: &[usize], data: &[f64], distance: usize) -> Vec<usize> {
    let mut keep = vec![true; peaks.len()];

    // Ascending by height (stable, so equal heights keep sample order and
    // -0.0 ties with 0.0); walk from the tallest down
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| {
        data[peaks[a]]
            .partial_cmp(&data[peaks[b]])
            .unwrap_or(Ordering::Equal)
    });

    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }

        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }

        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter(|(_, kept)| *kept)
        .map(|(&p, _)| p)
        .collect()
}

/// Find the maxima that qualify as heartbeats.
///
/// A maximum is a beat when it rises at least `min_peak_to_valley_range`
/// above the nearest valley strictly before it. Maxima with no preceding
/// valley are discarded.
pub fn detect_beats(data: &[f64], config: &AnalysisConfig) -> Vec<usize> {
    let spacing = config.min_peak_spacing.max(1);
    if data.len() < spacing * 2 {
        return Vec::new();
    }

    let peaks = find_peaks(data, spacing);
    let inverted: Vec<f64> = data.iter().map(|x| -x).collect();
    let valleys = find_peaks(&inverted, spacing);

    debug!(
        "{} candidate peaks, {} valleys (spacing {})",
        peaks.len(),
        valleys.len(),
        spacing
    );

    let beats: Vec<usize> = peaks
        .into_iter()
        .filter(|&peak| {
            let preceding = valleys.partition_point(|&v| v < peak);
            if preceding == 0 {
                return false;
            }
            let valley = valleys[preceding - 1];
            data[peak] - data[valley] >= config.min_peak_to_valley_range
        })
        .collect();

    trace!("Valid beats: {:?}", beats);
    beats
}

/// Seconds between consecutive beats
pub fn inter_beat_intervals(beats: &[usize], time_base: &TimeBase) -> Vec<f64> {
    beats
        .windows(2)
        .map(|w| time_base.seconds_between(w[0], w[1]))
        .collect()
}

/// Trailing mean over `window` values, `None` until the window is full
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];
    if window == 0 {
        return result;
    }

    let mut sum = 0.0;
    for i in 0..values.len() {
        sum += values[i];
        if i >= window {
            sum -= values[i - window];
        }
        if i + 1 >= window {
            result[i] = Some(sum / window as f64);
        }
    }

    result
}

/// Fill every undefined value from `start` onward.
///
/// Holes with defined data on both sides are linearly interpolated by
/// position (the left anchor may sit before `start`); leading holes take the
/// first defined value after them; anything past the last defined value
/// becomes zero.
pub fn fill_gap(values: &mut [Option<f64>], start: usize) {
    if start >= values.len() {
        return;
    }

    let mut next_defined: Vec<Option<(usize, f64)>> = vec![None; values.len()];
    let mut upcoming = None;
    for i in (start..values.len()).rev() {
        if let Some(v) = values[i] {
            upcoming = Some((i, v));
        }
        next_defined[i] = upcoming;
    }

    let mut prev = values[..start]
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, v)| v.map(|v| (i, v)));

    for i in start..values.len() {
        if let Some(v) = values[i] {
            prev = Some((i, v));
            continue;
        }

        values[i] = Some(match (prev, next_defined[i]) {
            (Some((pi, pv)), Some((ni, nv))) => {
                let weight = (i - pi) as f64 / (ni - pi) as f64;
                pv + (nv - pv) * weight
            }
            (None, Some((_, nv))) => nv,
            (_, None) => 0.0,
        });
    }
}

/// Instantaneous, smoothed and gap-filled BPM for a beat set.
/// Needs at least two beats.
pub fn estimate_bpm(
    beats: &[usize],
    time_base: &TimeBase,
    config: &AnalysisConfig,
) -> Option<BpmSeries> {
    if beats.len() < 2 {
        return None;
    }

    let intervals_seconds = inter_beat_intervals(beats, time_base);
    let instantaneous: Vec<f64> = intervals_seconds.iter().map(|s| 60.0 / s).collect();
    let smoothed = rolling_mean(&instantaneous, config.bpm_smoothing_window);

    let first_gap = intervals_seconds
        .iter()
        .position(|&s| s > config.max_gap_seconds);

    // Filling from the first gap covers every later one
    let mut filled = smoothed.clone();
    if let Some(gap) = first_gap {
        debug!(
            "Gap of {:.1}s after beat {}, filling {} BPM values",
            intervals_seconds[gap],
            beats[gap],
            filled.len().saturating_sub(gap + 1)
        );
        fill_gap(&mut filled, gap + 1);
    }

    let beat_indices = beats[1..].to_vec();
    let times_hours = beat_indices.iter().map(|&b| time_base.hours_at(b)).collect();

    Some(BpmSeries {
        beat_indices,
        times_hours,
        intervals_seconds,
        instantaneous,
        smoothed,
        filled,
        first_gap,
    })
}

/// Position and value of the highest defined BPM; ties keep the earliest
fn max_defined(values: &[Option<f64>]) -> Option<(usize, f64)> {
    values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .fold(None, |best, (i, v)| match best {
            Some((_, best_v)) if best_v >= v => best,
            _ => Some((i, v)),
        })
}

/// Death time and Topt for a subject
pub fn locate_events(
    beats: &[usize],
    bpm: Option<&BpmSeries>,
    time_base: &TimeBase,
) -> Events {
    let Some(bpm) = bpm else {
        return Events::default();
    };

    let (death_time_hours, last_beat_hours) = match bpm.first_gap {
        Some(gap) => (
            Some(time_base.hours_at(beats[gap + 1])),
            Some(time_base.hours_at(beats[gap])),
        ),
        None => (None, None),
    };

    let (topt_hours, max_smoothed_bpm) = match max_defined(&bpm.filled) {
        Some((i, value)) => (Some(bpm.times_hours[i]), Some(value)),
        None => (None, None),
    };

    Events {
        death_time_hours,
        last_beat_hours,
        topt_hours,
        max_smoothed_bpm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f64 = 20.0;

    /// Flat trace with a valley 5 samples before each beat
    fn synthetic_trace(len: usize, beats: &[usize], amplitude: f64) -> Vec<f64> {
        let mut data = vec![0.0; len];
        for &b in beats {
            data[b - 5] = -amplitude / 2.0;
            data[b] = amplitude / 2.0;
        }
        data
    }

    fn hours(index: usize) -> f64 {
        TimeBase::new(FS).hours_at(index)
    }

    /// Deterministic noisy pulse train
    fn noisy_trace(len: usize) -> Vec<f64> {
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        (0..len)
            .map(|i| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let noise = (state % 600) as f64 - 300.0;
                1200.0 * ((i as f64) * 0.3).sin() + noise
            })
            .collect()
    }

    #[test]
    fn find_peaks_handles_plateaus_and_edges() {
        let data = [5.0, 1.0, 3.0, 3.0, 3.0, 1.0, 2.0, 2.0, 4.0];
        // Edges are never peaks; the 3-3-3 plateau reports its midpoint
        assert_eq!(find_peaks(&data, 1), vec![3]);
    }

    #[test]
    fn find_peaks_keeps_taller_peak_within_distance() {
        let data = [0.0, 3.0, 0.0, 5.0, 0.0, 4.0, 0.0, 0.0, 0.0, 2.0, 0.0];
        assert_eq!(find_peaks(&data, 1), vec![1, 3, 5, 9]);
        assert_eq!(find_peaks(&data, 3), vec![3, 9]);
    }

    #[test]
    fn signed_zero_peaks_tie_on_height() {
        // Equal heights: the later peak is visited first and wins
        let data = [-1.0, 0.0, -1.0, -0.0, -1.0];
        assert_eq!(find_peaks(&data, 3), vec![3]);

        let data = [-1.0, -0.0, -1.0, 0.0, -1.0];
        assert_eq!(find_peaks(&data, 3), vec![3]);
    }

    #[test]
    fn detects_evenly_spaced_beats() {
        let beats_at = [100, 300, 500, 700];
        let data = synthetic_trace(4000, &beats_at, 1000.0);
        let config = AnalysisConfig::default();

        let beats = detect_beats(&data, &config);
        assert_eq!(beats, beats_at);

        let tb = TimeBase::new(FS);
        let intervals = inter_beat_intervals(&beats, &tb);
        assert_eq!(intervals, vec![10.0, 10.0, 10.0]);

        let bpm = estimate_bpm(&beats, &tb, &config).unwrap();
        assert_eq!(bpm.instantaneous, vec![6.0, 6.0, 6.0]);
        assert_eq!(bpm.beat_indices, vec![300, 500, 700]);
        assert!(bpm.smoothed.iter().all(Option::is_none));

        let events = locate_events(&beats, Some(&bpm), &tb);
        assert_eq!(events.death_time_hours, None);
        assert_eq!(events.topt_hours, None);
    }

    #[test]
    fn death_time_is_first_beat_after_long_gap() {
        let data = synthetic_trace(4000, &[100, 300, 500, 700, 3000], 1000.0);
        let config = AnalysisConfig::default();
        let tb = TimeBase::new(FS);

        let beats = detect_beats(&data, &config);
        assert_eq!(beats, vec![100, 300, 500, 700, 3000]);

        let bpm = estimate_bpm(&beats, &tb, &config).unwrap();
        assert_eq!(bpm.first_gap, Some(3));
        assert!((bpm.intervals_seconds[3] - 115.0).abs() < 1e-9);

        let events = locate_events(&beats, Some(&bpm), &tb);
        assert_eq!(events.death_time_hours, Some(3000.0 / 72_000.0));
        assert_eq!(events.last_beat_hours, Some(hours(700)));
    }

    #[test]
    fn topt_is_earliest_maximum_of_smoothed_bpm() {
        let data = synthetic_trace(4000, &[100, 300, 500, 700, 3000], 1000.0);
        let config = AnalysisConfig {
            bpm_smoothing_window: 2,
            ..AnalysisConfig::default()
        };
        let tb = TimeBase::new(FS);

        let beats = detect_beats(&data, &config);
        let bpm = estimate_bpm(&beats, &tb, &config).unwrap();
        assert_eq!(bpm.smoothed[0], None);
        assert_eq!(bpm.smoothed[1], Some(6.0));

        let events = locate_events(&beats, Some(&bpm), &tb);
        assert_eq!(events.topt_hours, Some(hours(500)));
        assert_eq!(events.max_smoothed_bpm, Some(6.0));
    }

    #[test]
    fn interval_equal_to_threshold_is_not_a_gap() {
        // 1200 samples at 20 Hz is exactly 60 s
        let beats = vec![100, 1300];
        let bpm = estimate_bpm(&beats, &TimeBase::new(FS), &AnalysisConfig::default()).unwrap();
        assert_eq!(bpm.first_gap, None);
    }

    #[test]
    fn boundary_amplitude_is_accepted() {
        let config = AnalysisConfig::default();
        let exact = synthetic_trace(1000, &[100, 300], 800.0);
        assert_eq!(detect_beats(&exact, &config), vec![100, 300]);

        let short = synthetic_trace(1000, &[100, 300], 799.0);
        assert!(detect_beats(&short, &config).is_empty());
    }

    #[test]
    fn peak_without_preceding_valley_is_discarded() {
        let mut data = vec![0.0; 200];
        data[10] = 2000.0;
        assert!(detect_beats(&data, &AnalysisConfig::default()).is_empty());
    }

    #[test]
    fn short_traces_yield_no_beats() {
        let config = AnalysisConfig::default();
        let mut data = vec![0.0; 29];
        data[5] = -1000.0;
        data[20] = 1000.0;
        assert!(detect_beats(&data, &config).is_empty());
    }

    #[test]
    fn accepted_beats_clear_their_preceding_valley() {
        let data = noisy_trace(6000);
        let config = AnalysisConfig {
            min_peak_to_valley_range: 1500.0,
            ..AnalysisConfig::default()
        };
        let beats = detect_beats(&data, &config);
        assert!(!beats.is_empty());

        let inverted: Vec<f64> = data.iter().map(|x| -x).collect();
        let valleys = find_peaks(&inverted, config.min_peak_spacing);

        assert!(beats.windows(2).all(|w| w[0] < w[1]));
        for &beat in &beats {
            assert!(beat < data.len());
            let valley = valleys.iter().rev().find(|&&v| v < beat).unwrap();
            assert!(data[beat] - data[*valley] >= config.min_peak_to_valley_range);
        }
    }

    #[test]
    fn zero_and_single_beat_produce_no_rate() {
        let tb = TimeBase::new(FS);
        let config = AnalysisConfig::default();

        let flat = vec![0.0; 4000];
        let beats = detect_beats(&flat, &config);
        assert!(beats.is_empty());
        assert!(estimate_bpm(&beats, &tb, &config).is_none());
        assert_eq!(locate_events(&beats, None, &tb), Events::default());

        let one = synthetic_trace(4000, &[100], 1000.0);
        let beats = detect_beats(&one, &config);
        assert_eq!(beats, vec![100]);
        assert!(inter_beat_intervals(&beats, &tb).is_empty());
        assert!(estimate_bpm(&beats, &tb, &config).is_none());
    }

    #[test]
    fn rolling_mean_is_trailing() {
        let out = rolling_mean(&[2.0, 4.0, 6.0, 8.0], 2);
        assert_eq!(out, vec![None, Some(3.0), Some(5.0), Some(7.0)]);
        assert!(rolling_mean(&[1.0], 3).iter().all(Option::is_none));
    }

    #[test]
    fn fill_gap_interpolates_then_zero_fills() {
        let mut values = vec![Some(6.0), Some(6.0), Some(6.0), Some(6.0), None, None, Some(8.0)];
        fill_gap(&mut values, 4);
        let filled: Vec<f64> = values.iter().map(|v| v.unwrap()).collect();
        assert!((filled[4] - 20.0 / 3.0).abs() < 1e-9);
        assert!((filled[5] - 22.0 / 3.0).abs() < 1e-9);
        assert!(filled.windows(2).all(|w| w[0] <= w[1]));

        let mut trailing = vec![Some(6.0), Some(7.0), None, None];
        fill_gap(&mut trailing, 2);
        assert_eq!(trailing, vec![Some(6.0), Some(7.0), Some(0.0), Some(0.0)]);
    }

    #[test]
    fn fill_gap_backfills_without_left_anchor() {
        let mut values = vec![None, None, Some(5.0), None];
        fill_gap(&mut values, 1);
        assert_eq!(values, vec![None, Some(5.0), Some(5.0), Some(0.0)]);
    }

    #[test]
    fn fill_stays_within_anchors() {
        let mut values = vec![Some(9.0), None, None, None, Some(3.0), None];
        fill_gap(&mut values, 1);
        for v in &values[1..4] {
            let v = v.unwrap();
            assert!(v <= 9.0 && v >= 3.0);
        }
        assert_eq!(values[5], Some(0.0));
    }

    #[test]
    fn early_gap_zero_fills_warm_up() {
        // 95 s gap straight away, too few beats for the smoothing window
        let beats = vec![100, 2000, 2200, 2400];
        let tb = TimeBase::new(FS);
        let config = AnalysisConfig::default();

        let bpm = estimate_bpm(&beats, &tb, &config).unwrap();
        assert_eq!(bpm.first_gap, Some(0));
        assert_eq!(bpm.filled, vec![None, Some(0.0), Some(0.0)]);

        let events = locate_events(&beats, Some(&bpm), &tb);
        assert_eq!(events.death_time_hours, Some(hours(2000)));
        assert_eq!(events.topt_hours, Some(hours(2200)));
        assert_eq!(events.max_smoothed_bpm, Some(0.0));
    }
}
