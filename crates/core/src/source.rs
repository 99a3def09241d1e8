//! Reader for the flat roster source files.
//!
//! One record per line: `<id> <last> <first> [patronymic...] <DD.MM.YYYY>`.
//! Blank lines and lines starting with `#` or `;` are ignored.

use crate::record::Record;
use log::{info, warn};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub file: PathBuf,
    /// 1-based; 0 when the file itself could not be read.
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, line {}: {}",
            self.file.display(),
            self.line,
            self.reason
        )
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub records: Vec<Record>,
    pub errors: Vec<ParseError>,
    pub total_lines: usize,
    pub valid_lines: usize,
    pub opened: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SourceReader;

impl SourceReader {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_file(&self, path: &Path) -> ParseReport {
        let mut report = ParseReport::default();
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                report.errors.push(ParseError {
                    file: path.to_path_buf(),
                    line: 0,
                    reason: format!("cannot read file: {e}"),
                });
                return report;
            }
        };
        report.opened = true;

        for (idx, raw) in contents.lines().enumerate() {
            report.total_lines += 1;
            let Some(line) = clean_line(raw) else {
                continue;
            };
            match parse_line(&line) {
                Ok(record) => {
                    report.records.push(record);
                    report.valid_lines += 1;
                }
                Err(reason) => report.errors.push(ParseError {
                    file: path.to_path_buf(),
                    line: idx + 1,
                    reason,
                }),
            }
        }

        report
    }

    /// Reads every file and concatenates the valid records, logging per-file
    /// statistics and each rejected line.
    pub fn parse_files<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<Record> {
        let mut all = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let report = self.parse_file(path);
            info!(
                "Parsed {}: {} lines, {} valid, {} errors",
                path.display(),
                report.total_lines,
                report.valid_lines,
                report.errors.len()
            );
            for err in &report.errors {
                warn!("{}", err);
            }
            all.extend(report.records);
        }
        all
    }
}

/// Trims, drops comments and collapses whitespace runs.
fn clean_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    Some(trimmed.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn parse_line(line: &str) -> Result<Record, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 4 {
        return Err(
            "not enough fields, expected: <id> <last name> <first name> [patronymic] <birth date>"
                .to_string(),
        );
    }

    let id: i64 = tokens[0]
        .parse()
        .map_err(|_| format!("invalid id format: {}", tokens[0]))?;
    if id < 0 {
        return Err(format!("id cannot be negative: {id}"));
    }

    // Anything between the first name and the date is a patronymic; it is
    // accepted but not stored.
    let last_name = tokens[1];
    let first_name = tokens[2];
    let birth_date = tokens[tokens.len() - 1];

    Record::try_new(id, last_name, first_name, birth_date).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_source(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[test]
    fn parses_records_with_and_without_patronymic() {
        let file = write_source(
            "# roster\n\
             1 Ivanov Ivan 01.01.1990\n\
             \n\
             2   Petrov  Petr Petrovich   02.02.1991\n\
             ; legacy comment\n\
             3 Sidorov Oleg Ivan Ivanovich 03.03.1993\n",
        );

        let report = SourceReader::new().parse_file(file.path());

        assert!(report.opened);
        assert_eq!(report.total_lines, 6);
        assert_eq!(report.valid_lines, 3);
        assert!(report.errors.is_empty());
        let names: Vec<String> = report.records.iter().map(Record::full_name).collect();
        assert_eq!(names, vec!["Ivanov Ivan", "Petrov Petr", "Sidorov Oleg"]);
        assert_eq!(report.records[1].birth_date_text(), "02.02.1991");
    }

    #[test]
    fn bad_lines_are_reported_with_line_numbers() {
        let file = write_source(
            "1 Ivanov Ivan 01.01.1990\n\
             2 Petrov 02.02.1991\n\
             -3 Sidorov Oleg 03.03.1993\n\
             x4 Orlov Oleg 04.04.1994\n\
             5 Orl0v Oleg 04.04.1994\n\
             6 Orlova Olga 31.04.2000\n",
        );

        let report = SourceReader::new().parse_file(file.path());

        assert_eq!(report.valid_lines, 1);
        let lines: Vec<usize> = report.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![2, 3, 4, 5, 6]);
        assert!(report.errors[1].reason.contains("negative"));
        assert!(report.errors[4].reason.contains("31.04.2000"));
        assert!(report.errors[0].to_string().contains(", line 2: "));
    }

    #[test]
    fn missing_file_yields_single_error() {
        let report = SourceReader::new().parse_file(Path::new("/definitely/not/here.txt"));
        assert!(!report.opened);
        assert!(report.records.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].line, 0);
    }

    #[test]
    fn parse_files_concatenates_valid_records() {
        let a = write_source("1 Ivanov Ivan 01.01.1990\n");
        let b = write_source("2 Petrov Petr 02.02.1991\nbroken\n");
        let records = SourceReader::new().parse_files(&[a.path(), b.path()]);
        let ids: Vec<i64> = records.iter().map(Record::id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
