//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use clap::Parser;
use tilewright_cli::Args;

fn main() {
    let args = Args::parse();
    tilewright_cli::init_logging(args.verbose);
    if let Err(err) = tilewright_cli::run(&args) {
        eprintln!("tilewright: {err}");
        std::process::exit(1);
    }
}
