//! Exception identity extraction and dedup.
//!
//! An exception block collapses to a flat token signature: the word-splits
//! of every line matching one of the identity patterns, concatenated in
//! line order, falling back to the first line's split when nothing matches.
//! Signatures are deduplicated through a dedicated template miner, and each
//! new signature is appended to an exception log together with its block.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::SiftError;
use crate::miner::{AddOutcome, TemplateMiner};

/// Ordered identity patterns: a typed exception with its message, then the
/// two "Caused by" shapes.
static IDENTITY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(java|scala|org)[.a-zA-Z0-9_:$@]*Exception: [.a-zA-Z0-9_:$@\s]*",
        r"Caused by: [.a-zA-Z0-9_$@]*(:[.a-zA-Z0-9_$@=\[\],<>\s]*)?",
        r"Caused by: [.a-zA-Z0-9_$@]*: [.a-zA-Z0-9_$@=\[\],<>\s:]+.*",
    ]
    .iter()
    .map(|p| Regex::new(&format!("^{}$", p)).expect("identity pattern"))
    .collect()
});

fn word_split(line: &str) -> Vec<String> {
    line.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Derive the flat identity token sequence of one exception block.
pub fn identity_tokens(block: &[String]) -> Vec<String> {
    let mut groups: Vec<Vec<String>> = Vec::new();

    for line in block {
        let trimmed = line.trim();
        for re in IDENTITY_PATTERNS.iter() {
            if re.is_match(trimmed) {
                groups.push(word_split(trimmed));
            }
        }
    }

    if groups.is_empty() {
        if let Some(first) = block.first() {
            groups.push(word_split(first));
        }
    }

    groups.into_iter().flatten().collect()
}

/// Render a signature the way it appears in the exception log.
pub fn render_signature(tokens: &[String]) -> String {
    format!("[{}]", tokens.join(","))
}

/// Severity recorded for every exception signature.
const EXCEPTION_LEVEL: &str = "ERROR";

/// Dedup index over exception blocks, backed by its own miner instance and
/// an append-only exception log.
pub struct ExceptionIndex {
    miner: Box<dyn TemplateMiner>,
    writer: BufWriter<std::fs::File>,
    counter: usize,
}

impl ExceptionIndex {
    /// Failure to open the log is fatal to the index and surfaced as
    /// [`SiftError::ExceptionLog`].
    pub fn create(path: &Path, miner: Box<dyn TemplateMiner>) -> Result<Self, SiftError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(SiftError::ExceptionLog)?;

        Ok(Self {
            miner,
            writer: BufWriter::new(file),
            counter: 0,
        })
    }

    /// Record one exception block, returning whether its signature was new
    /// and the rendered signature.
    pub fn add(&mut self, block: &[String]) -> Result<(AddOutcome, String), SiftError> {
        self.counter += 1;
        let tokens = identity_tokens(block);
        let rendered = render_signature(&tokens);
        let outcome = self.miner.add(self.counter, tokens, EXCEPTION_LEVEL);

        if outcome == AddOutcome::New {
            tracing::debug!(signature = %rendered, "new exception signature");
            writeln!(self.writer, "--------")?;
            writeln!(self.writer, "id:{}", rendered)?;
            for line in block {
                writeln!(self.writer, "  {}", line)?;
            }
        }

        Ok((outcome, rendered))
    }

    /// Distinct signatures seen so far.
    pub fn signature_count(&self) -> usize {
        self.miner.clusters().len()
    }

    /// Flush the exception log.
    pub fn finish(mut self) -> Result<(), SiftError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drain::DrainMiner;

    fn block(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identity_from_exception_header_only() {
        let tokens = identity_tokens(&block(&[
            "java.lang.NullPointerException: x",
            "\tat Foo.bar(Foo.java:10)",
        ]));
        assert_eq!(tokens, vec!["java", "lang", "NullPointerException", "x"]);
    }

    #[test]
    fn test_identity_concatenates_matching_lines_in_order() {
        let tokens = identity_tokens(&block(&[
            "java.lang.IllegalStateException: no session",
            "\tat App.main(App.java:3)",
            "Caused by: java.io.EOFException",
        ]));
        assert_eq!(
            tokens,
            vec![
                "java",
                "lang",
                "IllegalStateException",
                "no",
                "session",
                "Caused",
                "by",
                "java",
                "io",
                "EOFException"
            ]
        );
    }

    #[test]
    fn test_identity_falls_back_to_first_line() {
        let tokens = identity_tokens(&block(&["something odd happened", "and then more"]));
        assert_eq!(tokens, vec!["something", "odd", "happened"]);
    }

    #[test]
    fn test_empty_block_yields_empty_signature() {
        assert!(identity_tokens(&[]).is_empty());
    }

    #[test]
    fn test_index_dedups_recurring_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exceptions.txt");
        let miner = Box::new(DrainMiner::new(4, 0.5, 100));
        let mut index = ExceptionIndex::create(&path, miner).unwrap();

        let trace = block(&[
            "java.lang.NullPointerException: x",
            "\tat Foo.bar(Foo.java:10)",
        ]);
        let (first, sig) = index.add(&trace).unwrap();
        let (second, _) = index.add(&trace).unwrap();

        assert_eq!(first, AddOutcome::New);
        assert_eq!(second, AddOutcome::Matched);
        assert_eq!(sig, "[java,lang,NullPointerException,x]");
        assert_eq!(index.signature_count(), 1);

        index.finish().unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.matches("--------").count(), 1);
        assert!(written.contains("id:[java,lang,NullPointerException,x]"));
        assert!(written.contains("  \tat Foo.bar(Foo.java:10)"));
    }

    #[test]
    fn test_create_fails_with_distinct_error_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no").join("such").join("dir").join("e.txt");
        let miner = Box::new(DrainMiner::new(4, 0.5, 100));
        let err = ExceptionIndex::create(&path, miner).err().unwrap();
        assert!(matches!(err, SiftError::ExceptionLog(_)));
    }
}
