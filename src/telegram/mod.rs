mod bot;
mod commands;

pub use commands::run_bot;
