mod app;

use std::env;
use std::process::ExitCode;

use app::cli::{self, CliCommand};
use tracing::error;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match cli::parse_args(&args) {
        Ok(CliCommand::Help) => {
            println!("{}", cli::usage_text());
            return ExitCode::SUCCESS;
        }
        Ok(CliCommand::Replay(options)) => options,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    let wiring = match app::bootstrap::build_app(&options) {
        Ok(wiring) => wiring,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };
    app::loop_runner::run(wiring)
}
