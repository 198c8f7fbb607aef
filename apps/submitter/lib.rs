pub mod chain;
pub mod config;
pub mod effects;
pub mod forms;
pub mod polls;
pub mod resolver;
pub mod runner;
pub mod server;
pub mod submission;

/// Address shape accepted without a lookup.
pub const ADDRESS_PATTERN: &str = r"^0x[a-fA-F0-9]{40}$";
/// Names ending with this suffix are sent to the name resolver.
pub const ENS_SUFFIX: &str = ".eth";
