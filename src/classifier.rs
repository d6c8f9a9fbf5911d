//! Line classification state machine.
//!
//! Walks the raw line sequence of one file with a single line of lookahead,
//! partitioning it into structured records, unclassified text, and
//! multi-line exception blocks attached to the line that preceded them.
//! Every input line lands in exactly one emitted record: either as its text
//! or inside an attached block.

use once_cell::sync::Lazy;
use regex::Regex;

/// Fragments a multi-line exception block is made of, in match order:
/// indentation continuations, "Caused by" variants, stack frames,
/// elided-frame markers, typed exceptions with a message, stray closing
/// brackets, and the generic "identifier: message" shape.
static EXCEPTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\s+.*",
        r"Caused by: [.a-zA-Z0-9_$@]*(:[.a-zA-Z0-9_$@=\[\],<>\s]*)?",
        r"Caused by: [.a-zA-Z0-9_$@]*: [.a-zA-Z0-9_$@=\[\],<>\s:]+.*",
        r"at [.a-zA-Z0-9_$@<>]*\([.a-zA-Z0-9_$@<>\s]*[:\[0-9]*\]?\).*",
        r"\.\.\. [0-9]* more",
        r"\.\.\. [0-9]* common frames omitted",
        r"(java|scala|org)[.a-zA-Z0-9_:$@]*Exception: [.a-zA-Z0-9_:$@\s]*",
        r"\]\)",
        r"[.a-zA-Z0-9_$]+: .*",
    ]
    .iter()
    .map(|p| Regex::new(&format!("^{}$", p)).expect("exception pattern"))
    .collect()
});

static NON_ASCII: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\x00-\x7F]+").expect("non-ascii pattern"));

/// Placeholder substituted for non-ASCII byte runs before any predicate
/// runs, so classification is encoding-independent.
pub const NON_ASCII_TOKEN: &str = "<NASCII>";

/// Replace non-ASCII byte runs with [`NON_ASCII_TOKEN`].
pub fn scrub_non_ascii(line: &str) -> String {
    NON_ASCII.replace_all(line, NON_ASCII_TOKEN).into_owned()
}

/// One emitted record. `block` is empty when no lines were attached.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedLine {
    Structured { text: String, block: Vec<String> },
    Unclassified { text: String, block: Vec<String> },
}

impl ClassifiedLine {
    pub fn text(&self) -> &str {
        match self {
            ClassifiedLine::Structured { text, .. } => text,
            ClassifiedLine::Unclassified { text, .. } => text,
        }
    }

    pub fn block(&self) -> &[String] {
        match self {
            ClassifiedLine::Structured { block, .. } => block,
            ClassifiedLine::Unclassified { block, .. } => block,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ClassifiedLine::Structured { .. })
    }
}

pub struct LineClassifier {
    line_pattern: Regex,
}

impl LineClassifier {
    /// `line_pattern` is the per-source structured-record pattern, supplied
    /// externally (usually compiled from the source's log format).
    pub fn new(line_pattern: Regex) -> Self {
        Self { line_pattern }
    }

    fn is_structured(&self, line: &str) -> bool {
        self.line_pattern.is_match(line.trim())
    }

    fn is_exception_line(line: &str) -> bool {
        let trimmed = line.trim();
        EXCEPTION_PATTERNS.iter().any(|re| re.is_match(trimmed))
    }

    /// Greedy scan from `start`: consume lines that are exception fragments
    /// or non-structured continuations, stop without consuming at the first
    /// structured line. Returns whether any consumed line was a true
    /// fragment, the consumed lines, and the index of the first unconsumed
    /// line.
    fn scan_maybe_exception(&self, lines: &[String], start: usize) -> (bool, Vec<String>, usize) {
        let mut block = Vec::new();
        let mut has_exceptions = false;
        let mut j = start;

        while j < lines.len() {
            let line = &lines[j];
            if Self::is_exception_line(line) {
                has_exceptions = true;
                block.push(line.clone());
            } else if !self.is_structured(line) {
                block.push(line.clone());
            } else {
                return (has_exceptions, block, j);
            }
            j += 1;
        }

        (has_exceptions, block, j)
    }

    /// Classify the line at `i`, returning the emitted record and the next
    /// cursor position.
    fn step(&self, lines: &[String], i: usize) -> (ClassifiedLine, usize) {
        let line = scrub_non_ascii(&lines[i]);
        let next = if i + 1 < lines.len() {
            scrub_non_ascii(&lines[i + 1])
        } else {
            String::new()
        };

        let is_logline = self.is_structured(&line);
        let is_next_logline = self.is_structured(&next);
        let is_next_exception = Self::is_exception_line(&next);

        if is_logline && is_next_exception {
            let (_, block, next_idx) = self.scan_maybe_exception(lines, i + 1);
            (
                ClassifiedLine::Structured {
                    text: line.trim().to_string(),
                    block,
                },
                next_idx,
            )
        } else if is_logline && !is_next_exception && !is_next_logline {
            // The lookahead is inconclusive; scan and keep the run only if
            // it actually contained a true fragment.
            let (has_exceptions, block, next_idx) = self.scan_maybe_exception(lines, i + 1);
            if has_exceptions {
                (
                    ClassifiedLine::Structured {
                        text: line.trim().to_string(),
                        block,
                    },
                    next_idx,
                )
            } else {
                (
                    ClassifiedLine::Structured {
                        text: line.trim().to_string(),
                        block: Vec::new(),
                    },
                    i + 1,
                )
            }
        } else if is_logline {
            (
                ClassifiedLine::Structured {
                    text: line.trim().to_string(),
                    block: Vec::new(),
                },
                i + 1,
            )
        } else if is_next_exception {
            let (_, block, next_idx) = self.scan_maybe_exception(lines, i + 1);
            (
                ClassifiedLine::Unclassified {
                    text: line.trim().to_string(),
                    block,
                },
                next_idx,
            )
        } else if !is_next_logline {
            let (_, block, next_idx) = self.scan_maybe_exception(lines, i + 1);
            (ClassifiedLine::Unclassified { text: line, block }, next_idx)
        } else {
            (
                ClassifiedLine::Unclassified {
                    text: line,
                    block: Vec::new(),
                },
                i + 1,
            )
        }
    }

    /// Classify one file's ordered line list.
    pub fn classify(&self, lines: &[String]) -> Vec<ClassifiedLine> {
        let mut result = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let (record, next) = self.step(lines, i);
            result.push(record);
            i = next;
        }
        result
    }
}
