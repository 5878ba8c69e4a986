use monitor_core::{ConfigError, KeywordPriority};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

const KEYWORD_COLUMNS: &[&str] = &["keyword", "keywords", "term"];
const PRIORITY_COLUMNS: &[&str] = &["priority", "tier"];
const VOLUME_COLUMNS: &[&str] = &["volume", "search volume"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordEntry {
    pub keyword: String,
    pub volume: u64,
    /// `None` when the file has no priority column
    pub priority: Option<KeywordPriority>,
}

fn find_column(headers: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| aliases.contains(&h.trim().to_lowercase().as_str()))
}

fn parse_priority(value: &str) -> KeywordPriority {
    match value.trim().to_lowercase().as_str() {
        "primary" | "high" | "p1" | "1" => KeywordPriority::Primary,
        _ => KeywordPriority::Secondary,
    }
}

fn parse_volume(value: &str) -> u64 {
    let cleaned: String = value.chars().filter(|c| *c != ',' && *c != '_').collect();
    let cleaned = cleaned.trim();
    cleaned
        .parse::<u64>()
        .or_else(|_| cleaned.parse::<f64>().map(|v| v.max(0.0) as u64))
        .unwrap_or(0)
}

/// Read a keyword table from CSV.
///
/// Entries come back de-duplicated. Without a priority column they are
/// sorted by volume, highest first; ties keep file order.
pub fn load_keyword_file(path: &Path) -> Result<Vec<KeywordEntry>, ConfigError> {
    let keyword_file_error = |reason: String| ConfigError::KeywordFile {
        path: path.display().to_string(),
        reason,
    };

    if !path.is_file() {
        return Err(keyword_file_error("file not found".to_string()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(keyword_file_error("missing header row".to_string()));
    }

    let keyword_col = find_column(&headers, KEYWORD_COLUMNS).unwrap_or(0);
    let priority_col = find_column(&headers, PRIORITY_COLUMNS);
    let volume_col = find_column(&headers, VOLUME_COLUMNS);

    info!(
        keyword_column = headers.get(keyword_col).unwrap_or_default(),
        has_priority = priority_col.is_some(),
        has_volume = volume_col.is_some(),
        "Reading keyword file"
    );

    let mut entries: Vec<KeywordEntry> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;

    for record in reader.records() {
        let record = record?;
        let keyword = record.get(keyword_col).unwrap_or("").trim().to_lowercase();
        if keyword.chars().count() <= 1 || keyword == "nan" {
            skipped += 1;
            continue;
        }

        let volume = volume_col
            .and_then(|i| record.get(i))
            .map(parse_volume)
            .unwrap_or(0);
        let priority = priority_col.map(|i| parse_priority(record.get(i).unwrap_or("")));

        match index.get(&keyword) {
            Some(&i) => {
                let existing = &mut entries[i];
                existing.volume = existing.volume.max(volume);
                if priority == Some(KeywordPriority::Primary) {
                    existing.priority = priority;
                }
            }
            None => {
                index.insert(keyword.clone(), entries.len());
                entries.push(KeywordEntry {
                    keyword,
                    volume,
                    priority,
                });
            }
        }
    }

    if entries.is_empty() {
        return Err(keyword_file_error("no usable keywords".to_string()));
    }
    if skipped > 0 {
        warn!(skipped, "Skipped blank or too-short keyword rows");
    }

    if priority_col.is_none() {
        entries.sort_by(|a, b| b.volume.cmp(&a.volume));
    }

    info!(count = entries.len(), "Loaded keywords");
    Ok(entries)
}
