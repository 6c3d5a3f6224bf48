mod aggregator;
mod aws;
mod cli;
mod environment;
mod error;
#[cfg(test)]
mod fake;
mod job_manager;
mod log_tailer;
mod model;
mod status_monitor;

use clap::Parser;
use cli::Cli;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = cli::run(cli) {
        eprintln!("ERROR: {:#}", err);
        std::process::exit(1);
    }
}
