//! Dictionary sources: CSV exports and SQLite source tables.

use crate::text;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid table name: {0:?}")]
    InvalidTable(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// A known phrase and the category it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub text_value: String,
    pub attribute_code: String,
    #[serde(default)]
    pub node_id: Option<String>,
}

impl DictionaryEntry {
    pub fn new(text_value: impl Into<String>, attribute_code: impl Into<String>) -> Self {
        Self {
            text_value: text_value.into(),
            attribute_code: attribute_code.into(),
            node_id: None,
        }
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Lowercased, trimmed copy; `None` when nothing indexable remains.
    pub fn normalized(self) -> Option<Self> {
        let text_value = self.text_value.trim().to_lowercase();
        if text_value.is_empty() {
            return None;
        }
        Some(Self {
            text_value,
            attribute_code: self.attribute_code.trim().to_string(),
            node_id: self.node_id.filter(|id| !id.trim().is_empty()),
        })
    }

    pub fn tokens(&self) -> Vec<String> {
        text::tokenize(&self.text_value)
    }

    pub fn bigrams(&self) -> Vec<String> {
        text::bigram_keys(&self.tokens())
    }
}

/// Where the dictionary comes from when an index has to be built.
#[derive(Debug, Clone)]
pub enum DictionarySource {
    Csv(PathBuf),
    Sqlite { path: PathBuf, table: String },
    Entries(Vec<DictionaryEntry>),
}

impl DictionarySource {
    pub fn load(&self) -> SourceResult<Vec<DictionaryEntry>> {
        match self {
            DictionarySource::Csv(path) => read_csv(std::fs::File::open(path)?),
            DictionarySource::Sqlite { path, table } => read_sqlite(path, table),
            DictionarySource::Entries(entries) => Ok(entries
                .iter()
                .cloned()
                .filter_map(DictionaryEntry::normalized)
                .collect()),
        }
    }
}

/// Read `text_value,attribute_code[,node_id]` rows. Blank phrases are skipped.
pub fn read_csv<R: io::Read>(reader: R) -> SourceResult<Vec<DictionaryEntry>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut entries = Vec::new();
    for row in rdr.deserialize::<DictionaryEntry>() {
        if let Some(entry) = row?.normalized() {
            entries.push(entry);
        }
    }
    tracing::debug!(entries = entries.len(), "read dictionary csv");
    Ok(entries)
}

/// Read the same columns from a SQLite table. `node_id` is optional.
pub fn read_sqlite(path: &Path, table: &str) -> SourceResult<Vec<DictionaryEntry>> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SourceError::InvalidTable(table.to_string()));
    }

    let conn = rusqlite::Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let has_node_id = {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let columns = stmt.query_map([], |row| row.get::<_, String>(1))?;
        let mut found = false;
        for column in columns {
            if column? == "node_id" {
                found = true;
            }
        }
        found
    };

    let sql = if has_node_id {
        format!("SELECT text_value, attribute_code, node_id FROM {table}")
    } else {
        format!("SELECT text_value, attribute_code, NULL FROM {table}")
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(DictionaryEntry {
            text_value: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
            attribute_code: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            node_id: row.get::<_, Option<String>>(2)?,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        if let Some(entry) = row?.normalized() {
            entries.push(entry);
        }
    }
    tracing::debug!(entries = entries.len(), table, "read dictionary table");
    Ok(entries)
}

/// Most frequent category; ties go to the lexicographically smallest code.
pub fn dominant_category(entries: &[DictionaryEntry]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        *counts.entry(entry.attribute_code.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(code, _)| code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_csv_normalizes_and_skips_blank_rows() {
        let data = "text_value,attribute_code,node_id\n\
                    Cabernet Sauvignon ,varietal,n1\n\
                    \"   \",varietal,\n\
                    Chateau Latour,brand,\n";
        let entries = read_csv(data.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], DictionaryEntry::new("cabernet sauvignon", "varietal").with_node_id("n1"));
        assert_eq!(entries[1].text_value, "chateau latour");
        assert_eq!(entries[1].node_id, None);
    }

    #[test]
    fn test_read_csv_without_node_id_column() {
        let data = "text_value,attribute_code\nMerlot,varietal\n";
        let entries = read_csv(data.as_bytes()).unwrap();
        assert_eq!(entries, vec![DictionaryEntry::new("merlot", "varietal")]);
    }

    #[test]
    fn test_entry_derivations() {
        let entry = DictionaryEntry::new("chateau la tour", "brand");
        assert_eq!(entry.tokens(), vec!["chateau", "la", "tour"]);
        assert_eq!(entry.bigrams(), vec!["chateau_la", "la_tour"]);
    }

    #[test]
    fn test_dominant_category() {
        let entries = vec![
            DictionaryEntry::new("chateau latour", "brand"),
            DictionaryEntry::new("opus one", "brand"),
            DictionaryEntry::new("merlot", "varietal"),
        ];
        assert_eq!(dominant_category(&entries).as_deref(), Some("brand"));
        assert_eq!(dominant_category(&[]), None);

        let tied = vec![
            DictionaryEntry::new("red", "color"),
            DictionaryEntry::new("merlot", "varietal"),
        ];
        assert_eq!(dominant_category(&tied).as_deref(), Some("color"));
    }

    #[test]
    fn test_read_sqlite_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dictionary.sqlite");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE domain_dictionary (text_value TEXT, attribute_code TEXT);
             INSERT INTO domain_dictionary VALUES ('Napa Valley', 'region');
             INSERT INTO domain_dictionary VALUES ('', 'region');
             INSERT INTO domain_dictionary VALUES ('Red', 'color');",
        )
        .unwrap();
        drop(conn);

        let entries = read_sqlite(&path, "domain_dictionary").unwrap();
        assert_eq!(
            entries,
            vec![
                DictionaryEntry::new("napa valley", "region"),
                DictionaryEntry::new("red", "color"),
            ]
        );
    }

    #[test]
    fn test_read_sqlite_rejects_unsafe_table_name() {
        let err = read_sqlite(Path::new("unused.sqlite"), "items; DROP TABLE x").unwrap_err();
        assert!(matches!(err, SourceError::InvalidTable(_)));
    }
}
