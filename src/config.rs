use anyhow::{ensure, Result};
use clap::Parser;
use std::path::PathBuf;

/// Thresholds the beat detector and BPM estimator depend on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisConfig {
    /// Sampling frequency of every trace (Hz)
    pub sample_rate_hz: f64,
    /// Rolling standard deviation window (samples)
    pub rolling_std_window: usize,
    /// Minimum separation between detected maxima, and between minima (samples)
    pub min_peak_spacing: usize,
    /// Minimum amplitude difference between a peak and its preceding valley
    pub min_peak_to_valley_range: f64,
    /// BPM rolling mean window (beats)
    pub bpm_smoothing_window: usize,
    /// Inter-beat interval above which beating is considered to have stopped (seconds)
    pub max_gap_seconds: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 20.0,
            // 2 minutes at 20 Hz. A 10 minute window would be 12000 samples.
            rolling_std_window: 2400,
            min_peak_spacing: 15,
            min_peak_to_valley_range: 800.0,
            bpm_smoothing_window: 200,
            max_gap_seconds: 60.0,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0,
            "sample rate must be positive, got {}",
            self.sample_rate_hz
        );
        ensure!(self.min_peak_spacing >= 1, "minimum peak spacing must be at least 1 sample");
        ensure!(
            self.bpm_smoothing_window >= 1,
            "BPM smoothing window must be at least 1 beat"
        );
        ensure!(
            self.max_gap_seconds.is_finite() && self.max_gap_seconds > 0.0,
            "maximum gap must be positive, got {}",
            self.max_gap_seconds
        );
        ensure!(
            self.min_peak_to_valley_range.is_finite(),
            "peak-to-valley range must be finite"
        );
        Ok(())
    }

    /// Real-time length of the rolling std window in minutes
    pub fn rolling_std_window_minutes(&self) -> f64 {
        self.rolling_std_window as f64 / self.sample_rate_hz / 60.0
    }
}

/// Detect heartbeats, BPM, time of death and Topt in pulse-amplitude traces
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Input table (CSV or Feather), or a directory of them
    #[arg(help = "Input table (CSV or Feather), or a directory of them")]
    pub input_path: PathBuf,

    /// Results CSV path
    #[arg(long, default_value = "results.csv")]
    pub output: PathBuf,

    /// Directory for per-subject beat tables
    #[arg(long)]
    pub beats_output: Option<PathBuf>,

    /// Directory for rolling std and heartbeat plots
    #[arg(long)]
    pub plot_dir: Option<PathBuf>,

    /// Print the results as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Wall-clock start of the recording (format: YYYY-MM-DD HH:MM)
    #[arg(long)]
    pub recording_start: Option<String>,

    /// Column to leave out of the analysis (repeatable)
    #[arg(long = "exclude-column")]
    pub exclude_columns: Vec<String>,

    /// Sampling frequency in Hz
    #[arg(long, default_value = "20.0")]
    pub sample_rate: f64,

    /// Rolling standard deviation window in samples
    #[arg(long, default_value = "2400")]
    pub rolling_std_window: usize,

    /// Minimum sample separation between peaks (and between valleys)
    #[arg(long, default_value = "15")]
    pub min_peak_spacing: usize,

    /// Minimum peak-to-valley amplitude for a valid beat
    #[arg(long, default_value = "800.0")]
    pub min_peak_to_valley_range: f64,

    /// Window size in beats for smoothing BPM
    #[arg(long, default_value = "200")]
    pub bpm_smoothing_window: usize,

    /// Beat gap in seconds that counts as cessation
    #[arg(long, default_value = "60.0", env = "PULSE_MAX_GAP_SECONDS")]
    pub max_gap_seconds: f64,
}

impl Args {
    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            sample_rate_hz: self.sample_rate,
            rolling_std_window: self.rolling_std_window,
            min_peak_spacing: self.min_peak_spacing,
            min_peak_to_valley_range: self.min_peak_to_valley_range,
            bpm_smoothing_window: self.bpm_smoothing_window,
            max_gap_seconds: self.max_gap_seconds,
        }
    }
}
