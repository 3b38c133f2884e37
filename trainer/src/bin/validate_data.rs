use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use diabetes_trainer::validate::DEFAULT_DATA_PATH;
use diabetes_trainer::{validate_dataset, ValidationError};
use env_logger::Env;
use log::{debug, error};

/// Check that a diabetes CSV has every required column and no missing values.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(long, default_value = DEFAULT_DATA_PATH)]
    data_path: PathBuf,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();

    let args = Args::parse();
    match validate_dataset(&args.data_path) {
        Ok(report) => {
            debug!("{} rows, {} missing cells", report.rows, report.total_nulls);
            println!("{}", report.message());
            ExitCode::SUCCESS
        }
        Err(e @ (ValidationError::NotFound { .. } | ValidationError::MissingColumns(_))) => {
            println!("{}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Could not validate {}: {}", args.data_path.display(), e);
            ExitCode::FAILURE
        }
    }
}
