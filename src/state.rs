//! Persisted route table: one CSV row per destination channel, carrying
//! that route's delivery watermark.
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("route table parse error: {0}")]
    Parse(#[from] csv::Error),
    #[error("route table is empty: {0}")]
    Empty(String),
}

/// One (source project, destination webhook) pairing with its own
/// watermark. Several routes may share a project id; the watermark is
/// still tracked per route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncRoute {
    pub channel: String,
    #[serde(rename = "projectId")]
    pub project_id: String,
    pub webhook: String,
    /// Last successfully delivered `added_at`, epoch milliseconds.
    /// Monotonically non-decreasing across successful runs.
    #[serde(rename = "lastDate")]
    pub last_date: i64,
}

/// Load the full route table. Any failure here is fatal to the run:
/// delivering without the prior watermarks risks re-sending or skipping.
pub fn load(path: &Path) -> Result<Vec<SyncRoute>, StateError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut routes = Vec::new();
    for row in reader.deserialize() {
        routes.push(row?);
    }
    if routes.is_empty() {
        return Err(StateError::Empty(path.display().to_string()));
    }
    Ok(routes)
}

/// Write the whole table back in one pass.
pub fn save(path: &Path, routes: &[SyncRoute]) -> Result<(), StateError> {
    let mut writer = csv::Writer::from_path(path)?;
    for route in routes {
        writer.serialize(route)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_routes() -> Vec<SyncRoute> {
        vec![
            SyncRoute {
                channel: "papers-general".into(),
                project_id: "419191".into(),
                webhook: "https://hooks.example.com/T0/B1/general".into(),
                last_date: 1_706_000_123_456,
            },
            SyncRoute {
                channel: "papers-ml".into(),
                project_id: "528000".into(),
                webhook: "https://hooks.example.com/T0/B2/ml".into(),
                last_date: 0,
            },
        ]
    }

    #[test]
    fn roundtrip_preserves_millisecond_watermarks() {
        let td = tempdir().unwrap();
        let path = td.path().join("routes.csv");
        let routes = sample_routes();
        save(&path, &routes).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, routes);
        // lastDate exceeds 32-bit range; make sure nothing clipped it.
        assert_eq!(loaded[0].last_date, 1_706_000_123_456);
    }

    #[test]
    fn load_parses_hand_written_table() {
        let td = tempdir().unwrap();
        let path = td.path().join("routes.csv");
        std::fs::write(
            &path,
            "channel,projectId,webhook,lastDate\n\
             papers,419191,https://hooks.example.com/x,1700000000000\n",
        )
        .unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].project_id, "419191");
        assert_eq!(loaded[0].last_date, 1_700_000_000_000);
    }

    #[test]
    fn load_rejects_missing_column() {
        let td = tempdir().unwrap();
        let path = td.path().join("routes.csv");
        std::fs::write(&path, "channel,projectId,lastDate\npapers,1,2\n").unwrap();
        assert!(matches!(load(&path), Err(StateError::Parse(_))));
    }

    #[test]
    fn load_rejects_missing_file() {
        let td = tempdir().unwrap();
        let path = td.path().join("nope.csv");
        assert!(load(&path).is_err());
    }

    #[test]
    fn load_rejects_empty_table() {
        let td = tempdir().unwrap();
        let path = td.path().join("routes.csv");
        std::fs::write(&path, "channel,projectId,webhook,lastDate\n").unwrap();
        assert!(matches!(load(&path), Err(StateError::Empty(_))));
    }
}
