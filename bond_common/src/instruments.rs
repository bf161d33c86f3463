//! Instrument identifier lists supplied on the command line or in a file.

use std::io::BufRead;

use crate::error::MonitorError;

/// Split a list of instrument identifiers separated by commas or whitespace.
///
/// Empty entries are dropped; order and duplicates are preserved as given.
pub fn parse_list(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read instrument identifiers from a buffered reader.
///
/// Lines may hold one or several identifiers separated by commas or spaces; lines
/// starting with `#` are comments. An input that yields no identifiers is an error.
pub fn parse_from_reader<R: BufRead>(reader: R) -> Result<Vec<String>, MonitorError> {
    let mut instruments = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let trimmed_line = line.trim();
        if trimmed_line.is_empty() || trimmed_line.starts_with('#') {
            continue;
        }
        instruments.extend(parse_list(trimmed_line));
    }

    if instruments.is_empty() {
        return Err(MonitorError::ParseInstruments(
            "no instrument identifiers found".to_string(),
        ));
    }
    Ok(instruments)
}
