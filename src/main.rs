use clap::Parser;
use quantback::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
