//! Pieces of the `buildops_cli` operator tool that are worth testing outside the binary.

pub mod commands;
pub mod table;

pub use commands::{execute, parse_command, print_value, Command, HELP};
pub use table::render_table;
