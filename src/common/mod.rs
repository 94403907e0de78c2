pub mod package;
pub mod platform;
pub mod process;
pub mod shell;
