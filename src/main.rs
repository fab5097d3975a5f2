use autosort::cli::{Cli, run_cli};
use autosort::logging::init_logging;
use autosort::output::OutputFormatter;
use clap::Parser;
use std::process;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run_cli(cli) {
        OutputFormatter::error(&e.to_string());
        process::exit(1);
    }
}
