use crate::{SubjectAnalysis, TimeBase};
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime};
use log::warn;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One row of the results table
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResultRow {
    pub source: String,
    pub subject: String,
    pub samples: usize,
    pub valid_beats: usize,
    pub death_time_hours: Option<f64>,
    pub last_beat_hours: Option<f64>,
    pub topt_hours: Option<f64>,
    pub max_smoothed_bpm: Option<f64>,
    pub death_timestamp: Option<String>,
    pub topt_timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
struct BeatRow {
    sample_index: usize,
    time_hours: f64,
    amplitude: f64,
    interval_seconds: Option<f64>,
    instantaneous_bpm: Option<f64>,
    smoothed_bpm: Option<f64>,
    filled_bpm: Option<f64>,
}

/// Parse a recording start like the CLI accepts it (YYYY-MM-DD HH:MM)
pub fn parse_recording_start(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .with_context(|| format!("Invalid recording start '{}', expected YYYY-MM-DD HH:MM", s))
}

fn wall_clock(start: Option<NaiveDateTime>, hours: Option<f64>) -> Option<String> {
    let start = start?;
    let millis = (hours? * 3_600_000.0).round() as i64;
    Some(
        (start + Duration::milliseconds(millis))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
    )
}

impl ResultRow {
    pub fn new(
        source: &str,
        analysis: &SubjectAnalysis,
        recording_start: Option<NaiveDateTime>,
    ) -> Self {
        let events = &analysis.events;
        Self {
            source: source.to_string(),
            subject: analysis.subject.clone(),
            samples: analysis.sample_count,
            valid_beats: analysis.beats.len(),
            death_time_hours: events.death_time_hours,
            last_beat_hours: events.last_beat_hours,
            topt_hours: events.topt_hours,
            max_smoothed_bpm: events.max_smoothed_bpm,
            death_timestamp: wall_clock(recording_start, events.death_time_hours),
            topt_timestamp: wall_clock(recording_start, events.topt_hours),
        }
    }
}

pub fn write_results_csv(path: &Path, rows: &[ResultRow]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    println!("Writing results to {}", path.display());
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_results_json(rows: &[ResultRow]) -> Result<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Path for a subject's beat table that no earlier table in `written` uses.
/// Subjects whose names sanitize to the same file get a numeric suffix.
fn unique_beats_path(
    dir: &Path,
    stem: &str,
    subject: &str,
    written: &mut HashSet<PathBuf>,
) -> PathBuf {
    let base = format!("{}_{}", stem, sanitize(subject));
    let mut path = dir.join(format!("{}_beats.csv", base));
    let mut n = 2;
    while written.contains(&path) {
        path = dir.join(format!("{}_{}_beats.csv", base, n));
        n += 1;
    }
    if n > 2 {
        warn!(
            "Beat table name for subject {} already used, writing {}",
            subject,
            path.display()
        );
    }
    written.insert(path.clone());
    path
}

/// Write one row per valid beat for a subject. The first beat has no
/// preceding interval, so its rate columns are empty.
pub fn write_beats_csv(
    dir: &Path,
    stem: &str,
    analysis: &SubjectAnalysis,
    samples: &[f64],
    time_base: &TimeBase,
    written: &mut HashSet<PathBuf>,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let full_path = unique_beats_path(dir, stem, &analysis.subject, written);
    let mut writer = csv::Writer::from_path(&full_path)
        .with_context(|| format!("Failed to create {}", full_path.display()))?;

    for (i, &beat) in analysis.beats.iter().enumerate() {
        let rate = i
            .checked_sub(1)
            .and_then(|k| analysis.bpm.as_ref().map(|bpm| (bpm, k)));

        writer.serialize(BeatRow {
            sample_index: beat,
            time_hours: time_base.hours_at(beat),
            amplitude: samples[beat],
            interval_seconds: rate.map(|(bpm, k)| bpm.intervals_seconds[k]),
            instantaneous_bpm: rate.map(|(bpm, k)| bpm.instantaneous[k]),
            smoothed_bpm: rate.and_then(|(bpm, k)| bpm.smoothed[k]),
            filled_bpm: rate.and_then(|(bpm, k)| bpm.filled[k]),
        })?;
    }

    writer.flush()?;
    Ok(full_path)
}
