use crate::{SubjectAnalysis, TimeBase, Trace};
use anyhow::Result;
use plotters::prelude::*;
use plotters::element::DashedPathElement;
use std::path::Path;

const WIDTH: u32 = 1000;
const PANEL_HEIGHT: u32 = 200;
const MAX_POINTS: usize = 4000;

// Tick spacing in hours
const STD_TICK_HOURS: f64 = 0.25;
const BEAT_TICK_HOURS: f64 = 1.0;

// (dash, gap) in pixels
const DEATH_DASH: (i32, i32) = (12, 6);
const TOPT_DASH: (i32, i32) = (4, 4);
const BPM_DASH: (i32, i32) = (8, 5);

/// Keep at most `max_points` evenly strided points
pub fn decimate_points(points: &[(f64, f64)], max_points: usize) -> Vec<(f64, f64)> {
    if max_points == 0 || points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    (0..max_points)
        .map(|i| (i as f64 * bucket_size).floor() as usize)
        .take_while(|&start| start < points.len())
        .map(|start| points[start])
        .collect()
}

/// Plot range covering `values`, padded so flat or empty data still draws
fn value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if min == max {
        return (min - 1.0, max + 1.0);
    }
    let pad = (max - min) * 0.05;
    (min - pad, max + pad)
}

/// Number of x labels that lands one tick on every `step` hours of `span`
pub fn tick_count(span: f64, step: f64) -> usize {
    if !(span > 0.0 && step > 0.0) {
        return 2;
    }
    ((span / step).floor() as usize + 1).max(2)
}

fn format_hours(x: &f64) -> String {
    format!("{:.2}", x)
}

fn time_span(analyses: &[SubjectAnalysis], time_base: &TimeBase) -> f64 {
    let samples = analyses.iter().map(|a| a.sample_count).max().unwrap_or(0);
    let hours = time_base.duration_hours(samples);
    if hours > 0.0 {
        hours
    } else {
        1.0
    }
}

/// One stacked panel of rolling standard deviation per subject
pub fn draw_rolling_std(path: &Path, analyses: &[SubjectAnalysis], time_base: &TimeBase) -> Result<()> {
    if analyses.is_empty() {
        return Ok(());
    }

    let root =
        BitMapBackend::new(path, (WIDTH, PANEL_HEIGHT * analyses.len() as u32)).into_drawing_area();
    root.fill(&WHITE)?;
    let x_max = time_span(analyses, time_base);

    for (panel, analysis) in root.split_evenly((analyses.len(), 1)).iter().zip(analyses) {
        let points: Vec<(f64, f64)> = analysis
            .rolling_std
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (time_base.hours_at(i), v)))
            .collect();
        let points = decimate_points(&points, MAX_POINTS);
        let (y_min, y_max) = value_range(points.iter().map(|p| p.1));

        let mut chart = ChartBuilder::on(panel)
            .margin(5)
            .caption(&analysis.subject, ("sans-serif", 16))
            .x_label_area_size(25)
            .y_label_area_size(60)
            .build_cartesian_2d(0.0..x_max, y_min..y_max)?;
        chart
            .configure_mesh()
            .x_labels(tick_count(x_max, STD_TICK_HOURS))
            .x_label_formatter(&format_hours)
            .x_desc("Time (Hours)")
            .y_desc("Pulse Variation (Std Dev)")
            .draw()?;
        chart.draw_series(LineSeries::new(points, BLUE.stroke_width(1)))?;
    }

    root.present()?;
    Ok(())
}

/// Raw signal with valid beats, death and Topt markers, and smoothed BPM on
/// a secondary axis, one panel per subject
pub fn draw_beats(
    path: &Path,
    traces: &[Trace],
    analyses: &[SubjectAnalysis],
    time_base: &TimeBase,
) -> Result<()> {
    if analyses.is_empty() {
        return Ok(());
    }

    let root =
        BitMapBackend::new(path, (WIDTH, PANEL_HEIGHT * analyses.len() as u32)).into_drawing_area();
    root.fill(&WHITE)?;
    let x_max = time_span(analyses, time_base);

    let panels = root.split_evenly((analyses.len(), 1));
    for ((panel, trace), analysis) in panels.iter().zip(traces).zip(analyses) {
        let raw: Vec<(f64, f64)> = trace
            .samples
            .iter()
            .enumerate()
            .map(|(i, &v)| (time_base.hours_at(i), v))
            .collect();
        let raw = decimate_points(&raw, MAX_POINTS);
        let (y_min, y_max) = value_range(trace.samples.iter().copied());

        let bpm_points: Vec<(f64, f64)> = analysis
            .bpm
            .iter()
            .flat_map(|bpm| {
                bpm.times_hours
                    .iter()
                    .zip(&bpm.filled)
                    .filter_map(|(&t, v)| v.map(|v| (t, v)))
            })
            .collect();
        let bpm_points = decimate_points(&bpm_points, MAX_POINTS);
        let bpm_max = bpm_points.iter().map(|p| p.1).fold(1.0, f64::max) * 1.1;

        let mut chart = ChartBuilder::on(panel)
            .margin(5)
            .caption(&analysis.subject, ("sans-serif", 16))
            .x_label_area_size(25)
            .y_label_area_size(60)
            .right_y_label_area_size(40)
            .build_cartesian_2d(0.0..x_max, y_min..y_max)?
            .set_secondary_coord(0.0..x_max, 0.0..bpm_max);

        chart
            .configure_mesh()
            .x_labels(tick_count(x_max, BEAT_TICK_HOURS))
            .x_label_formatter(&format_hours)
            .x_desc("Time (Hours)")
            .y_desc("Pulse Amplitude")
            .draw()?;

        chart.draw_series(LineSeries::new(raw, BLUE.mix(0.5).stroke_width(1)))?;
        chart.draw_series(analysis.beats.iter().map(|&b| {
            Cross::new(
                (time_base.hours_at(b), trace.samples[b]),
                3,
                RED.mix(0.5).stroke_width(1),
            )
        }))?;

        let mut labelled = false;
        if let Some(t) = analysis.events.death_time_hours {
            chart
                .draw_series(DashedLineSeries::new(
                    vec![(t, y_min), (t, y_max)],
                    DEATH_DASH.0,
                    DEATH_DASH.1,
                    BLUE.stroke_width(3),
                ))?
                .label(format!("Time of Death: {:.2} hours", t))
                .legend(|(x, y)| {
                    DashedPathElement::new(
                        vec![(x, y), (x + 24, y)],
                        DEATH_DASH.0,
                        DEATH_DASH.1,
                        BLUE.stroke_width(3),
                    )
                });
            labelled = true;
        }

        if !bpm_points.is_empty() {
            chart.configure_secondary_axes().y_desc("BPM").draw()?;
            chart.draw_secondary_series(DashedLineSeries::new(
                bpm_points,
                BPM_DASH.0,
                BPM_DASH.1,
                BLACK.stroke_width(2),
            ))?;
        }

        if let Some(t) = analysis.events.topt_hours {
            chart
                .draw_series(DashedLineSeries::new(
                    vec![(t, y_min), (t, y_max)],
                    TOPT_DASH.0,
                    TOPT_DASH.1,
                    GREEN.stroke_width(3),
                ))?
                .label(format!("Topt: {:.2} hours", t))
                .legend(|(x, y)| {
                    DashedPathElement::new(
                        vec![(x, y), (x + 24, y)],
                        TOPT_DASH.0,
                        TOPT_DASH.1,
                        GREEN.stroke_width(3),
                    )
                });
            labelled = true;
        }

        if labelled {
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::LowerRight)
                .background_style(&WHITE)
                .border_style(&BLACK)
                .draw()?;
        }
    }

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimation_keeps_short_series_intact() {
        let points: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, i as f64)).collect();
        assert_eq!(decimate_points(&points, 100), points);
    }

    #[test]
    fn decimation_strides_long_series() {
        let points: Vec<(f64, f64)> = (0..1000).map(|i| (i as f64, 0.0)).collect();
        let out = decimate_points(&points, 10);
        assert_eq!(out.len(), 10);
        assert_eq!(out[0].0, 0.0);
        assert_eq!(out[1].0, 100.0);
    }

    #[test]
    fn ticks_follow_requested_step() {
        assert_eq!(tick_count(2.0, 0.25), 9);
        assert_eq!(tick_count(5.5, 1.0), 6);
        assert_eq!(tick_count(0.1, 1.0), 2);
        assert_eq!(tick_count(0.0, 0.25), 2);
    }

    #[test]
    fn event_line_patterns_are_distinct() {
        assert_ne!(DEATH_DASH, TOPT_DASH);
        assert_ne!(BPM_DASH, TOPT_DASH);
    }

    #[test]
    fn value_range_pads_flat_and_empty_data() {
        assert_eq!(value_range(std::iter::empty()), (0.0, 1.0));
        assert_eq!(value_range([5.0, 5.0].into_iter()), (4.0, 6.0));
        let (lo, hi) = value_range([0.0, 100.0].into_iter());
        assert!(lo < 0.0 && hi > 100.0);
    }
}
