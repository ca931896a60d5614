use anyhow::Result;
use pulse_decoder::data_loading::{read_table, traces_from_frame};
use pulse_decoder::TimeBase;
use std::path::Path;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        println!("Usage: {} <table> [sample_rate_hz]", args[0]);
        std::process::exit(1);
    }

    let sample_rate: f64 = match args.get(2) {
        Some(s) => s.parse()?,
        None => 20.0,
    };
    let time_base = TimeBase::new(sample_rate);

    let df = read_table(Path::new(&args[1]))?;
    println!("\nSchema:");
    println!("{:#?}", df.schema());

    println!("\nSubjects:");
    for trace in traces_from_frame(&df, &[]) {
        println!(
            "  {}: {} samples ({:.2} hours at {} Hz)",
            trace.subject,
            trace.len(),
            time_base.duration_hours(trace.len()),
            sample_rate
        );
    }

    Ok(())
}
