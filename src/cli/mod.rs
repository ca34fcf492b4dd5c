//! CLI module for nmt-q8
//!
//! All logic lives here for testability. The binary (`src/bin/nmt-q8.rs`)
//! is a thin shell that only calls `cli::run()`.
//!
//! ```text
//! src/cli/
//! ├── mod.rs       # module exports
//! ├── args.rs      # argument parsing with clap
//! ├── commands.rs  # bench, demo and shapes
//! └── output.rs    # text and JSON reports
//! ```

pub mod args;
pub mod commands;
pub mod output;

pub use args::{Args, Command};
pub use commands::{run, CliError, CliResult, CommandResult};
pub use output::OutputFormat;
