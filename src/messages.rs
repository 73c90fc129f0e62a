pub const MSG_SUCCESS: &str = "Success!";

/// Autocomplete entries registered with Telegram, keyed by command name.
pub const COMMAND_DESCRIPTIONS: &[(&str, &str)] = &[
    ("status", "Show last fetch time of the service"),
    ("start", "Start the service"),
    ("stop", "Stop the service"),
    ("restart", "Restart the service"),
    ("deploy", "Rebuild and restart the service"),
    ("backup", "Back up the data file to Cloud Storage"),
];

pub fn command_description(name: &str) -> &'static str {
    COMMAND_DESCRIPTIONS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, d)| *d)
        .unwrap_or("")
}
