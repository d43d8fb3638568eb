pub mod commands;
pub mod console;
pub mod context;
pub mod logging;

pub use context::CliContext;
