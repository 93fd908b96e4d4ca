//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `PL_LOG_LEVEL`: Log-Level oder Filter-Direktive, Standard aus der Config
//! - `PL_LOG_FORMAT`: Format (text/json), Standard aus der Config
//!
//! Die Umgebung hat Vorrang vor dem Abschnitt `[logging]` der Config.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialisiert das Logging-System.
///
/// Darf nur einmal pro Prozess aufgerufen werden.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env("PL_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format_aus_env().unwrap_or_else(|| format.to_string()).as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Log-Format aus `PL_LOG_FORMAT`, falls gesetzt
pub fn log_format_aus_env() -> Option<String> {
    std::env::var("PL_LOG_FORMAT").ok()
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
