use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, NaiveDate};
use std::fs;
use std::path::Path;

/// Parse a strict YYYYMMDD date, naming the offending argument in errors
pub fn parse_date(date_str: &str, field_name: &str) -> Result<NaiveDate> {
    if date_str.len() != 8 || !date_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(anyhow!("{} must be 8 digits in YYYYMMDD format, got: {}", field_name, date_str));
    }

    let date = NaiveDate::parse_from_str(date_str, "%Y%m%d")
        .map_err(|e| anyhow!("Invalid {} {}: {}", field_name, date_str, e))?;

    // Shanghai and Shenzhen exchanges both opened in 1990
    if !(1990..=2100).contains(&date.year()) {
        return Err(anyhow!("Year in {} must be between 1990 and 2100, got: {}", field_name, date.year()));
    }

    Ok(date)
}

/// Split a comma or whitespace separated list of codes, dropping blanks
pub fn parse_symbol_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read codes from a file, one or more per line; `#` starts a comment
pub fn read_symbols_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read symbols file {}", path.display()))?;

    Ok(content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .flat_map(parse_symbol_list)
        .collect())
}

/// Write codes one per line, in the format `read_symbols_file` accepts
pub fn write_symbols_file(path: &Path, symbols: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut content = symbols.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    fs::write(path, content)
        .with_context(|| format!("Failed to write symbols file {}", path.display()))
}
