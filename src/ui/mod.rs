//! User-facing output

pub mod reporter;

pub use reporter::{ConsoleReporter, Reporter};
