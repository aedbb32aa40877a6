mod commands;
mod renderer;

pub use commands::{ConsoleCommand, HELP_TEXT};
pub use renderer::{render_snapshot, render_summary};
