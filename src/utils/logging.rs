/// Initialize tracing/logging for the application.
///
/// `default_level` selects the maximum level; unknown names fall back to
/// `info`. With `json` set, events are written as one JSON object per line.
pub fn init(default_level: &str, json: bool) {
    let lvl = parse_level(default_level);

    // try_init so tests and libraries can call this multiple times without panicking
    if json {
        let _ = tracing_subscriber::fmt()
            .json()
            .with_max_level(lvl)
            .with_target(false)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_max_level(lvl)
            .with_target(false)
            .try_init();
    }
}

pub fn parse_level(name: &str) -> tracing::Level {
    match name.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" | "warning" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}
