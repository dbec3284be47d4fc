//! Embedded sample wine dictionary and labelled utterances.
//!
//! Shared by the attrex tests, benches and the CLI so they all run against the
//! same data without touching the filesystem.

use once_cell::sync::Lazy;
use serde::Deserialize;

/// `text_value,attribute_code,node_id`
pub const WINE_DICTIONARY_CSV: &str = include_str!("../data/wine_dictionary.csv");

/// `sentence,expected` where `expected` is a JSON array of attributes.
pub const TEST_CASES_CSV: &str = include_str!("../data/test_cases.csv");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoCase {
    pub sentence: String,
    pub expected: Vec<String>,
}

#[derive(Deserialize)]
struct CaseRow {
    sentence: String,
    expected: String,
}

static CASES: Lazy<Vec<DemoCase>> = Lazy::new(|| {
    parse_cases(TEST_CASES_CSV.as_bytes()).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to parse embedded test cases: {}", e);
        Vec::new()
    })
});

/// Parse a labelled case file. Blank `expected` cells mean no attribute.
pub fn parse_cases<R: std::io::Read>(reader: R) -> Result<Vec<DemoCase>, Box<dyn std::error::Error>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut cases = Vec::new();
    for row in rdr.deserialize::<CaseRow>() {
        let row = row?;
        let expected = if row.expected.is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&row.expected)?
        };
        cases.push(DemoCase { sentence: row.sentence, expected });
    }
    Ok(cases)
}

/// The embedded dictionary as a CSV reader source.
pub fn dictionary_reader() -> &'static [u8] {
    WINE_DICTIONARY_CSV.as_bytes()
}

/// The embedded labelled utterances, parsed on first use.
pub fn cases() -> &'static [DemoCase] {
    &CASES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_parses() {
        let mut rdr = csv::Reader::from_reader(dictionary_reader());
        let headers: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, vec!["text_value", "attribute_code", "node_id"]);
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert!(rows.len() > 40);
        assert!(rows.iter().any(|r| &r[0] == "Chateau Latour" && &r[1] == "brand"));
        assert!(rows.iter().all(|r| !r[2].is_empty()));
    }

    #[test]
    fn test_cases_parse() {
        let cases = cases();
        assert!(!cases.is_empty());
        let red = cases.iter().find(|c| c.sentence == "red chateau lator").unwrap();
        assert_eq!(red.expected, vec!["red", "chateau latour"]);
        let none = cases.iter().find(|c| c.sentence == "how are you").unwrap();
        assert!(none.expected.is_empty());
    }

    #[test]
    fn test_parse_cases_blank_expected() {
        let cases = parse_cases("sentence,expected\nhello,\n".as_bytes()).unwrap();
        assert_eq!(cases[0].expected, Vec::<String>::new());
    }
}
