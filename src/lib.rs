pub mod config;
pub mod data_loading;
pub mod heart_analysis;
pub mod output;
pub mod plot;
pub mod variability;

use config::AnalysisConfig;
use heart_analysis::{BpmSeries, Events};

/// Uniform time axis reconstructed from sample position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBase {
    pub sample_rate_hz: f64,
}

impl TimeBase {
    pub fn new(sample_rate_hz: f64) -> Self {
        Self { sample_rate_hz }
    }

    pub fn samples_per_hour(&self) -> f64 {
        self.sample_rate_hz * 3600.0
    }

    /// Time of a sample in hours from the start of the recording
    pub fn hours_at(&self, index: usize) -> f64 {
        index as f64 / self.samples_per_hour()
    }

    pub fn seconds_between(&self, from: usize, to: usize) -> f64 {
        (to as f64 - from as f64) / self.sample_rate_hz
    }

    pub fn duration_hours(&self, sample_count: usize) -> f64 {
        self.hours_at(sample_count)
    }
}

/// One subject's amplitude readings on the uniform sample grid.
#[derive(Debug, Clone)]
pub struct Trace {
    pub subject: String,
    pub samples: Vec<f64>,
}

impl Trace {
    pub fn new(subject: impl Into<String>, samples: Vec<f64>) -> Self {
        Self {
            subject: subject.into(),
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Everything derived from one subject's trace.
#[derive(Debug, Clone)]
pub struct SubjectAnalysis {
    pub subject: String,
    pub sample_count: usize,
    pub rolling_std: Vec<Option<f64>>,
    pub beats: Vec<usize>,
    pub bpm: Option<BpmSeries>,
    pub events: Events,
}

/// Run both stages on a single trace. Never fails: a flat or unusable
/// trace simply yields no beats and no events.
pub fn analyze_trace(trace: &Trace, time_base: &TimeBase, config: &AnalysisConfig) -> SubjectAnalysis {
    let rolling_std = variability::rolling_std(&trace.samples, config.rolling_std_window);
    let beats = heart_analysis::detect_beats(&trace.samples, config);
    let bpm = heart_analysis::estimate_bpm(&beats, time_base, config);
    let events = heart_analysis::locate_events(&beats, bpm.as_ref(), time_base);

    log::debug!(
        "{}: {} samples, {} valid beats, death={:?}, topt={:?}",
        trace.subject,
        trace.len(),
        beats.len(),
        events.death_time_hours,
        events.topt_hours
    );

    SubjectAnalysis {
        subject: trace.subject.clone(),
        sample_count: trace.len(),
        rolling_std,
        beats,
        bpm,
        events,
    }
}
