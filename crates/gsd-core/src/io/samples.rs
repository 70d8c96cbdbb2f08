//! Sample text format.
//!
//! One sample per line, five non-negative integer counts separated by
//! whitespace. Blank lines and lines starting with `#` are skipped.

use std::path::Path;

use gsd_common::{Error, Result, Sample, CATEGORIES};

use super::read_input;

/// Parse sample text. Errors carry the 1-based line number.
pub fn parse_samples(text: &str) -> Result<Vec<Sample>> {
    let mut samples = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        samples.push(parse_line(line).map_err(|message| Error::SampleParse {
            line: i + 1,
            message,
        })?);
    }
    Ok(samples)
}

fn parse_line(line: &str) -> std::result::Result<Sample, String> {
    let mut counts = [0u32; CATEGORIES];
    let mut found = 0usize;
    for token in line.split_whitespace() {
        if found < CATEGORIES {
            counts[found] = token
                .parse::<u32>()
                .map_err(|e| format!("`{token}` is not a non-negative count: {e}"))?;
        }
        found += 1;
    }
    if found != CATEGORIES {
        return Err(format!("expected {CATEGORIES} counts, found {found}"));
    }
    Ok(Sample::new(counts))
}

/// Load samples from a text file.
pub fn load_samples(path: &Path) -> Result<Vec<Sample>> {
    let bytes = read_input(path)?;
    let text = String::from_utf8(bytes).map_err(|e| Error::SampleParse {
        line: 0,
        message: format!("file is not valid UTF-8: {e}"),
    })?;
    parse_samples(&text)
}
