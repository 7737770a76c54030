//! Logging utilities.
//!
//! Library code only uses the `log` facade; the binary installs `env_logger`
//! through [`init_logging`].

mod init;

pub use init::{init_logging, LoggingConfig};