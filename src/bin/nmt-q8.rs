//! nmt-q8 CLI: benchmark and demo driver
//!
//! Thin shell over `nmt_q8::cli`; all logic lives in the library.

use clap::Parser;
use nmt_q8::cli::{run, Args};

fn main() {
    #[cfg(feature = "tracing")]
    nmt_q8::trace::init_subscriber("warn");

    let args = Args::parse();

    match run(args) {
        Ok(result) => {
            if !result.success {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
