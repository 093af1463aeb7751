//! Command-line front end
//!
//! Thin handlers over the network layer; all output goes to stdout.

pub mod commands;

#[cfg(unix)]
pub use commands::cmd_connect;
pub use commands::{
    cmd_group, cmd_inspect, cmd_resolve, connect_target, load_config, with_timeout, AddrReport,
    CliResult,
};
