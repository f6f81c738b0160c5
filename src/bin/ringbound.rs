use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use ringbound::{
    scenario::{self, ScenarioConfig},
    telemetry::{initialize_fmt_subscriber, initialize_json_subscriber},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Output {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "ringbound")]
#[command(about = "Runs membership changes against a bounded-load consistent hash ring", long_about = None)]
struct Cli {
    #[arg(long, default_value = "conf/scenario.json")]
    config_path: PathBuf,
    #[arg(long, value_enum, default_value = "text")]
    output: Output,
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    if args.json_logs {
        initialize_json_subscriber();
    } else {
        initialize_fmt_subscriber();
    }

    let scenario = ScenarioConfig::from_path(&args.config_path)?;
    let outcome = scenario::run(&scenario)?;

    match args.output {
        Output::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        Output::Text => {
            println!("{}", outcome.initial);
            for (step, report) in outcome.steps.iter() {
                println!("after {:?}", step);
                println!("{}", report);
            }
        }
    }

    Ok(())
}
