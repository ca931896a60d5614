use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use pulse_decoder::config::Args;
use pulse_decoder::output::{self, ResultRow};
use pulse_decoder::{analyze_trace, data_loading, plot, SubjectAnalysis, TimeBase};
use std::collections::HashSet;
use std::path::Path;

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("results")
        .to_string()
}

fn print_summary(rows: &[ResultRow]) {
    let hours = |v: Option<f64>| v.map(|h| format!("{:.2} h", h)).unwrap_or_else(|| "-".into());

    println!("\nSubjects analysed: {}", rows.len());
    println!("------------------------");
    for row in rows {
        println!(
            "{} / {}: {} beats, death {}, Topt {}",
            row.source,
            row.subject,
            row.valid_beats,
            hours(row.death_time_hours),
            hours(row.topt_hours)
        );
    }
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    let args = Args::parse();
    let config = args.analysis_config();
    config.validate()?;
    let time_base = TimeBase::new(config.sample_rate_hz);

    let recording_start = args
        .recording_start
        .as_deref()
        .map(output::parse_recording_start)
        .transpose()?;

    info!(
        "Rolling std window: {} samples ({:.1} minutes at {} Hz)",
        config.rolling_std_window,
        config.rolling_std_window_minutes(),
        config.sample_rate_hz
    );
    debug!("Analysis config: {:?}", config);

    let files = data_loading::find_input_files(&args.input_path)?;
    let mut rows = Vec::new();
    let mut written_beat_tables = HashSet::new();

    for path in &files {
        println!("Loading file: {}", path.display());
        let traces = data_loading::load_traces(path, &args.exclude_columns)?;
        let source = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = file_stem(path);

        let analyses: Vec<SubjectAnalysis> = traces
            .iter()
            .map(|trace| analyze_trace(trace, &time_base, &config))
            .collect();

        for (trace, analysis) in traces.iter().zip(&analyses) {
            if analysis.beats.len() < 2 {
                warn!(
                    "{}: only {} valid beats, no BPM or events",
                    analysis.subject,
                    analysis.beats.len()
                );
            }

            if let Some(dir) = &args.beats_output {
                let written = output::write_beats_csv(
                    dir,
                    &stem,
                    analysis,
                    &trace.samples,
                    &time_base,
                    &mut written_beat_tables,
                )?;
                debug!("Wrote {}", written.display());
            }

            rows.push(ResultRow::new(&source, analysis, recording_start));
        }

        if let Some(dir) = &args.plot_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;

            let std_path = dir.join(format!("{}_rolling_std.png", stem));
            println!("Plotting rolling std to {}", std_path.display());
            plot::draw_rolling_std(&std_path, &analyses, &time_base)?;

            let beats_path = dir.join(format!("{}_beats.png", stem));
            println!("Plotting heartbeats to {}", beats_path.display());
            plot::draw_beats(&beats_path, &traces, &analyses, &time_base)?;
        }
    }

    output::write_results_csv(&args.output, &rows)?;

    if args.json {
        println!("{}", output::write_results_json(&rows)?);
    } else {
        print_summary(&rows);
    }

    Ok(())
}
