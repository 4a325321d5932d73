//! Tracing setup: maps `-ll` (0..3) onto a level filter and optionally
//! redirects output to a log file instead of stderr.

use std::fs::File;
use std::path::Path;

use tracing::Level;
use tracing_subscriber::EnvFilter;

fn level_for(log_level: u8) -> Level {
    match log_level {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    }
}

/// Initializes the global tracing subscriber. Must be called exactly once,
/// before any other module logs.
pub fn init(log_level: u8, log_file: Option<&Path>) -> std::io::Result<()> {
    let filter = EnvFilter::new(level_for(log_level).to_string());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            builder.with_writer(move || file.try_clone().expect("log file handle clone")).init();
        }
        None => builder.init(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_mapping_matches_verbosity_table() {
        assert_eq!(level_for(0), Level::ERROR);
        assert_eq!(level_for(1), Level::WARN);
        assert_eq!(level_for(2), Level::INFO);
        assert_eq!(level_for(3), Level::DEBUG);
        assert_eq!(level_for(99), Level::DEBUG);
    }
}
