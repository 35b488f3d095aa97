//! CLI module for streamsheet - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
