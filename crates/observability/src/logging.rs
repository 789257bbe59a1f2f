//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `PLAZA_LOG_LEVEL`: Log-Level oder EnvFilter-Direktive, Standard aus der Config
//! - `PLAZA_LOG_FORMAT`: Format (text/json), Standard aus der Config
//!
//! Die Umgebung hat Vorrang vor `[logging]` in der Config-Datei.

use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Level
pub const ENV_LOG_LEVEL: &str = "PLAZA_LOG_LEVEL";
/// Umgebungsvariable fuer das Log-Format
pub const ENV_LOG_FORMAT: &str = "PLAZA_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Schlaegt fehl wenn bereits ein globaler Subscriber gesetzt ist.
pub fn logging_initialisieren(level: &str, format: &str) -> anyhow::Result<()> {
    let level = einstellung_waehlen(std::env::var(ENV_LOG_LEVEL).ok(), level);
    let format = einstellung_waehlen(std::env::var(ENV_LOG_FORMAT).ok(), format);

    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let ergebnis = match format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.map_err(|e| anyhow::anyhow!("Logging-Initialisierung fehlgeschlagen: {e}"))?;

    if !log_format_gueltig(&format) {
        tracing::warn!(format = %format, "Unbekanntes Log-Format, verwende text");
    }
    Ok(())
}

/// Nicht-leerer Wert aus der Umgebung, sonst der Config-Wert
pub fn einstellung_waehlen(umgebung: Option<String>, konfiguriert: &str) -> String {
    umgebung
        .map(|wert| wert.trim().to_string())
        .filter(|wert| !wert.is_empty())
        .unwrap_or_else(|| konfiguriert.to_string())
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_gueltige_werte() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(log_level_gueltig(level));
        }
    }

    #[test]
    fn log_level_ungueltige_werte() {
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn log_format_werte() {
        assert!(log_format_gueltig("text"));
        assert!(log_format_gueltig("json"));
        assert!(!log_format_gueltig("JSON"));
        assert!(!log_format_gueltig("xml"));
    }

    #[test]
    fn umgebung_hat_vorrang() {
        assert_eq!(einstellung_waehlen(Some("debug".into()), "info"), "debug");
        assert_eq!(
            einstellung_waehlen(Some("plaza_signaling=trace".into()), "info"),
            "plaza_signaling=trace"
        );
    }

    #[test]
    fn leere_umgebung_faellt_auf_config_zurueck() {
        assert_eq!(einstellung_waehlen(None, "warn"), "warn");
        assert_eq!(einstellung_waehlen(Some("  ".into()), "json"), "json");
    }
}
