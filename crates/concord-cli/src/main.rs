//! Concord CLI - run async coordination scenarios

mod cli;
mod report;
mod scenario;

use clap::Parser;

fn main() {
    let cli_args = cli::Cli::parse();

    let app = match cli::ConcordApp::new() {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run(cli_args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
