//! Log-format preprocessing.
//!
//! A format string like `<Date> <Time> <Level> <Content>` compiles to an
//! anchored regex with one non-greedy named capture per header; the same
//! regex doubles as the classifier's structured-line predicate. Extracted
//! records accumulate across all files of a source and receive dense line
//! ids only once ingestion is finished.

use regex::Regex;

use crate::classifier::scrub_non_ascii;
use crate::error::SiftError;

/// Compiled log format: ordered headers plus the line-matching regex.
#[derive(Debug, Clone)]
pub struct LogFormat {
    headers: Vec<String>,
    pattern: Regex,
}

fn push_literal(dst: &mut String, literal: &str) {
    let mut chars = literal.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ' ' {
            while chars.peek() == Some(&' ') {
                chars.next();
            }
            dst.push_str(r"\s+");
        } else {
            dst.push(c);
        }
    }
}

impl LogFormat {
    pub fn compile(logformat: &str) -> Result<Self, SiftError> {
        let mut headers = Vec::new();
        let mut src = String::from("^");

        let mut remaining = logformat;
        while let Some(start) = remaining.find('<') {
            let (literal, rest) = remaining.split_at(start);
            push_literal(&mut src, literal);
            match rest[1..].find('>') {
                Some(end) => {
                    let header = &rest[1..1 + end];
                    src.push_str(&format!("(?P<{}>.*?)", header));
                    headers.push(header.to_string());
                    remaining = &rest[end + 2..];
                }
                None => {
                    push_literal(&mut src, rest);
                    remaining = "";
                }
            }
        }
        push_literal(&mut src, remaining);
        src.push('$');

        let pattern = Regex::new(&src)?;
        Ok(Self { headers, pattern })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn header_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// The structured-line predicate pattern for the classifier.
    pub fn line_pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Extract the header fields of one line, in header order.
    pub fn extract(&self, line: &str) -> Option<Vec<String>> {
        let caps = self.pattern.captures(line.trim())?;
        Some(
            self.headers
                .iter()
                .map(|h| caps.name(h).map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect(),
        )
    }
}

/// One extracted record with its dense line id.
#[derive(Debug, Clone)]
pub struct LineRecord {
    pub line_id: usize,
    pub fields: Vec<String>,
}

/// Accumulates structured records for one source.
pub struct Preprocessor {
    format: LogFormat,
    scrub: Vec<Regex>,
    content_idx: Option<usize>,
    rows: Vec<Vec<String>>,
    skipped: usize,
}

impl Preprocessor {
    pub fn new(format: LogFormat, scrub_patterns: &[String]) -> Result<Self, SiftError> {
        let scrub = scrub_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        let content_idx = format.header_index("Content");

        Ok(Self {
            format,
            scrub,
            content_idx,
            rows: Vec::new(),
            skipped: 0,
        })
    }

    pub fn format(&self) -> &LogFormat {
        &self.format
    }

    /// Extract one structured line; a failed extraction is a recoverable
    /// local skip, never an error.
    pub fn push_structured(&mut self, line: &str) {
        let line = scrub_non_ascii(line);
        match self.format.extract(&line) {
            Some(mut fields) => {
                if let Some(ci) = self.content_idx {
                    for re in &self.scrub {
                        fields[ci] = re.replace_all(&fields[ci], "*").into_owned();
                    }
                }
                self.rows.push(fields);
            }
            None => {
                self.skipped += 1;
                tracing::debug!(line = %line, "dropped line failing format extraction");
            }
        }
    }

    /// Assign dense 1..N line ids and hand the records over.
    pub fn finish(self) -> Vec<LineRecord> {
        if self.skipped > 0 {
            tracing::warn!(skipped = self.skipped, "records dropped during extraction");
        }
        self.rows
            .into_iter()
            .enumerate()
            .map(|(i, fields)| LineRecord {
                line_id: i + 1,
                fields,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_compiles_headers_in_order() {
        let format = LogFormat::compile("<Date> <Time> <Level> <Content>").unwrap();
        assert_eq!(format.headers(), &["Date", "Time", "Level", "Content"]);

        let fields = format
            .extract("2024-01-05 10:22:01 INFO service started on port 8080")
            .unwrap();
        assert_eq!(fields[0], "2024-01-05");
        assert_eq!(fields[1], "10:22:01");
        assert_eq!(fields[2], "INFO");
        assert_eq!(fields[3], "service started on port 8080");
    }

    #[test]
    fn test_space_runs_match_flexibly() {
        let format = LogFormat::compile("<Level>  <Content>").unwrap();
        let fields = format.extract("WARN    queue is filling up").unwrap();
        assert_eq!(fields, vec!["WARN", "queue is filling up"]);
    }

    #[test]
    fn test_failed_extraction_is_skipped_silently() {
        let format = LogFormat::compile("<Date> <Level> <Content>").unwrap();
        let mut pre = Preprocessor::new(format, &[]).unwrap();
        pre.push_structured("2024 INFO all good");
        pre.push_structured("");
        pre.push_structured("2024 WARN watch out");

        let records = pre.finish();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line_id, 1);
        assert_eq!(records[1].line_id, 2);
    }

    #[test]
    fn test_scrub_patterns_mask_content() {
        let format = LogFormat::compile("<Level> <Content>").unwrap();
        let mut pre = Preprocessor::new(
            format,
            &[r"\d+\.\d+\.\d+\.\d+".to_string()],
        )
        .unwrap();
        pre.push_structured("INFO peer 10.0.0.3 connected");

        let records = pre.finish();
        assert_eq!(records[0].fields[1], "peer * connected");
    }

    #[test]
    fn test_non_ascii_masked_before_extraction() {
        let format = LogFormat::compile("<Level> <Content>").unwrap();
        let mut pre = Preprocessor::new(format, &[]).unwrap();
        pre.push_structured("INFO caf\u{e9} ready");

        let records = pre.finish();
        assert_eq!(records[0].fields[1], "caf<NASCII> ready");
    }
}
