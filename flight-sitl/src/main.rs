use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::Parser;
use embassy_time::Duration;
use flight_sitl::{Scenario, run_scenario, run_scenario_with_log};

#[derive(Parser, Debug)]
#[command(about = "Fly the flight core against a simulated vehicle")]
struct Args {
    /// Scenario to fly (nominal, baro-dropout, short-tta)
    #[arg(default_value = "nominal")]
    scenario: String,

    /// Write the telemetry CSV here
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Override the backup timer's time to apogee, in seconds
    #[arg(long)]
    time_to_apogee: Option<u64>,

    /// Simulated seconds to run
    #[arg(long)]
    duration: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let Some(mut scenario) = Scenario::by_name(&args.scenario) else {
        return Err(format!(
            "unknown scenario '{}', expected one of: {}",
            args.scenario,
            Scenario::NAMES.join(", ")
        )
        .into());
    };
    if let Some(secs) = args.time_to_apogee {
        scenario.config.time_to_apogee = Duration::from_secs(secs);
    }
    if let Some(secs) = args.duration {
        scenario.duration = Duration::from_secs(secs);
    }

    let summary = match &args.csv {
        Some(path) => run_scenario_with_log(&scenario, BufWriter::new(File::create(path)?))?,
        None => run_scenario(&scenario)?,
    };
    print!("{}", summary);
    Ok(())
}
