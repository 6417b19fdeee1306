//! Logging Module
//!
//! Logger initialization for binaries and tests. Library code only talks to
//! the `log` facade; messages carry a bracketed subsystem prefix such as
//! `[Renderer]` or `[ShaderRegistry]`.

mod init;

pub use init::{LoggingConfig, init_logging};
