use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

/// `Full` logs response bodies; `Compact` keeps only request/status lines,
/// which is enough to reconstruct the call sequence without the payloads.
pub enum MessageLogMode {
    Full,
    Compact,
}

/// NDJSON log of cloud API traffic, one entry per line.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { mode, file })
    }

    pub fn log_request(&mut self, path: &str, form: &[(&str, String)]) {
        let fields: Vec<&str> = form.iter().map(|(k, _)| *k).collect();
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "path": path,
            "fields": fields,
        });
        self.write_line(&entry);
    }

    pub fn log_response(&mut self, path: &str, status: u16, body: &Value) {
        let entry = match self.mode {
            MessageLogMode::Full => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "resp",
                "path": path,
                "status": status,
                "body": body,
            }),
            MessageLogMode::Compact => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "resp",
                "path": path,
                "status": status,
            }),
        };
        self.write_line(&entry);
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::NamedTempFile;

    fn read_lines(path: &std::path::Path) -> Vec<Value> {
        let mut contents = String::new();
        std::fs::File::open(path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn request_logs_field_names_not_values() {
        let tmp = NamedTempFile::new().unwrap();
        let mut logger =
            MessageLogger::new(MessageLogMode::Full, tmp.path().to_str().unwrap()).unwrap();
        logger.log_request(
            "/api/homestatus",
            &[("home_id", "12ab".to_string())],
        );

        let lines = read_lines(tmp.path());
        assert_eq!(lines[0]["dir"], "req");
        assert_eq!(lines[0]["path"], "/api/homestatus");
        assert_eq!(lines[0]["fields"][0], "home_id");
        assert!(lines[0].get("home_id").is_none());
        assert!(lines[0]["ts"].as_str().is_some());
    }

    #[test]
    fn full_mode_keeps_bodies() {
        let tmp = NamedTempFile::new().unwrap();
        let mut logger =
            MessageLogger::new(MessageLogMode::Full, tmp.path().to_str().unwrap()).unwrap();
        logger.log_response("/api/homesdata", 200, &json!({"body": {"homes": []}}));

        let lines = read_lines(tmp.path());
        assert_eq!(lines[0]["status"], 200);
        assert!(lines[0]["body"]["body"]["homes"].is_array());
    }

    #[test]
    fn compact_mode_drops_bodies() {
        let tmp = NamedTempFile::new().unwrap();
        let mut logger =
            MessageLogger::new(MessageLogMode::Compact, tmp.path().to_str().unwrap()).unwrap();
        logger.log_response("/api/homesdata", 500, &json!({"error": "boom"}));

        let lines = read_lines(tmp.path());
        assert_eq!(lines[0]["status"], 500);
        assert!(lines[0].get("body").is_none());
    }
}
