//! Loading bars and signals from disk

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::overlay::SignalPatterns;
use crate::types::{PriceBar, TrackerKey};

/// CSV row: `timestamp,open,high,low,close[,volume]`
#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

/// RFC 3339 or epoch milliseconds
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let millis: i64 = raw
        .parse()
        .with_context(|| format!("Failed to parse timestamp: {}", raw))?;
    DateTime::from_timestamp_millis(millis)
        .with_context(|| format!("Timestamp out of range: {}", millis))
}

/// Read bars from a CSV file with a header row, in file order
pub fn load_bars_csv(path: &Path) -> Result<Vec<PriceBar>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open file: {:?}", path))?;

    let mut bars = Vec::new();
    for (line, result) in reader.deserialize().enumerate() {
        let row: CsvRow = result.with_context(|| format!("Failed to parse CSV row {} in {:?}", line + 1, path))?;
        let timestamp = parse_timestamp(&row.timestamp)?;
        bars.push(PriceBar::new(timestamp, row.open, row.high, row.low, row.close));
    }

    debug!("Loaded {} bars from {:?}", bars.len(), path);
    Ok(bars)
}

/// Split a file stem like "SOLUSDT_15m" into its tracker key
pub fn key_from_filename(path: &Path) -> Option<TrackerKey> {
    let stem = path.file_stem()?.to_string_lossy();
    let (symbol, timeframe) = stem.rsplit_once('_')?;
    if symbol.is_empty() || timeframe.is_empty() {
        return None;
    }
    Some(TrackerKey::new(symbol, timeframe))
}

/// Every `<SYMBOL>_<TF>.csv` in `dir`, sorted by key
pub fn find_bar_files(dir: &Path) -> Result<Vec<(TrackerKey, PathBuf)>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read directory: {:?}", dir))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        match key_from_filename(&path) {
            Some(key) => files.push((key, path)),
            None => debug!("Skipping {:?}: name is not SYMBOL_TIMEFRAME.csv", path),
        }
    }

    files.sort();
    Ok(files)
}

/// Read a scanner signal (bare or wrapped under `signal`)
pub fn load_signal(path: &Path) -> Result<SignalPatterns> {
    let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read signal: {:?}", path))?;
    SignalPatterns::from_json(&json).with_context(|| format!("Failed to parse signal: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    #[test]
    fn test_parse_timestamp() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 10, 8, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-10T08:30:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-03-10T09:30:00+01:00").unwrap(), expected);
        assert_eq!(parse_timestamp(&expected.timestamp_millis().to_string()).unwrap(), expected);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_key_from_filename() {
        assert_eq!(
            key_from_filename(Path::new("data/SOLUSDT_15m.csv")),
            Some(TrackerKey::new("SOLUSDT", "15m"))
        );
        assert_eq!(
            key_from_filename(Path::new("BTC_USDT_1h.csv")),
            Some(TrackerKey::new("BTC_USDT", "1h"))
        );
        assert_eq!(key_from_filename(Path::new("bars.csv")), None);
    }

    #[test]
    fn test_load_bars_csv() {
        let dir = std::env::temp_dir().join(format!("session_overlay_csv_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("SOLUSDT_15m.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(file, "2025-03-10T08:00:00Z,13.30,13.35,13.25,13.33,1200").unwrap();
        writeln!(file, "1741595400000, 13.33, 13.39, 13.30, 13.31, 900").unwrap();
        drop(file);

        let bars = load_bars_csv(&path).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].high, 13.35);
        assert_eq!(bars[1].timestamp, Utc.with_ymd_and_hms(2025, 3, 10, 8, 30, 0).unwrap());

        let files = find_bar_files(&dir).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, TrackerKey::new("SOLUSDT", "15m"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
