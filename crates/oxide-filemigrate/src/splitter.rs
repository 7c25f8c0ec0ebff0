//! Splits a migration file into individually executable statements.
//!
//! Files are scanned line by line. Ordinary statements end at a line whose
//! trimmed text ends with `;`. Routine definitions (`CREATE PROCEDURE`,
//! `CREATE FUNCTION`, `CREATE TRIGGER`) contain semicolons of their own, so
//! once such a definition opens a `BEGIN` body the statement only ends at a
//! line ending with `END;` (or `END <label>;` for a labelled body). On
//! PostgreSQL, routine bodies are usually dollar quoted (`AS $$ ... $$`); no
//! statement ends while a dollar quote is open.

use crate::dialect::Dialect;

/// Keywords that arm routine handling when they start a line.
const ROUTINE_PREFIXES: [&str; 6] = [
    "CREATE PROCEDURE",
    "CREATE FUNCTION",
    "CREATE TRIGGER",
    "CREATE OR REPLACE PROCEDURE",
    "CREATE OR REPLACE FUNCTION",
    "CREATE OR REPLACE TRIGGER",
];

/// Line-oriented SQL statement splitter.
#[derive(Debug, Clone, Copy)]
pub struct StatementSplitter {
    dialect: Dialect,
}

/// Scanner state for one file.
#[derive(Debug, Default)]
struct SplitState {
    /// Text of the statement being accumulated.
    buffer: String,
    /// Whether any statement text has been buffered yet.
    in_statement: bool,
    /// Inside a `/* ... */` comment that precedes a statement.
    in_leading_comment: bool,
    /// A routine definition started in the current statement.
    routine_armed: bool,
    /// Inside a routine's `BEGIN ... END;` body.
    in_body: bool,
    /// Label of the body, for `label: BEGIN ... END label;`.
    body_label: Option<String>,
    /// The currently open dollar-quote delimiter, e.g. `$$` or `$body$`.
    dollar_quote: Option<String>,
}

impl SplitState {
    fn take_statement(&mut self) -> String {
        let statement = self.buffer.trim_end().to_string();
        *self = Self::default();
        statement
    }
}

impl StatementSplitter {
    /// Creates a splitter for the given dialect.
    #[must_use]
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Returns the dialect this splitter was built for.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Splits raw file content into statements, preserving their order.
    #[must_use]
    pub fn split(&self, content: &str) -> Vec<String> {
        let mut statements = Vec::new();
        let mut state = SplitState::default();

        for line in content.lines() {
            let trimmed = line.trim();

            if !state.in_statement {
                if state.in_leading_comment {
                    if trimmed.contains("*/") {
                        state.in_leading_comment = false;
                    }
                    continue;
                }
                if trimmed.is_empty() || trimmed.starts_with("--") {
                    continue;
                }
                if let Some(rest) = trimmed.strip_prefix("/*") {
                    state.in_leading_comment = !rest.contains("*/");
                    continue;
                }
                state.in_statement = true;
            }

            let upper = trimmed.to_ascii_uppercase();
            if ROUTINE_PREFIXES.iter().any(|prefix| upper.starts_with(prefix)) {
                state.routine_armed = true;
            }

            if self.dialect.uses_dollar_quoting() {
                track_dollar_quotes(trimmed, &mut state.dollar_quote);
            }

            if state.routine_armed
                && !state.in_body
                && state.dollar_quote.is_none()
                && opens_body(&upper)
            {
                state.in_body = true;
                state.body_label = body_label(&upper);
            }

            state.buffer.push_str(line);
            state.buffer.push('\n');

            let ends_statement = if state.dollar_quote.is_some() {
                false
            } else if state.in_body {
                upper.ends_with("END;")
                    || state
                        .body_label
                        .as_deref()
                        .is_some_and(|label| closes_labelled_body(&upper, label))
            } else {
                trimmed.ends_with(';')
            };

            if ends_statement {
                statements.push(state.take_statement());
            }
        }

        if !state.buffer.trim().is_empty() {
            statements.push(state.take_statement());
        }

        statements
    }
}

/// Returns whether an upper-cased line opens a `BEGIN` body.
fn opens_body(upper: &str) -> bool {
    let mut tokens = upper.split_whitespace();
    if tokens.next() == Some("BEGIN") {
        return true;
    }
    let last = upper.split_whitespace().last().unwrap_or_default();
    last == "BEGIN" || last.ends_with(":BEGIN") || upper.ends_with("BEGIN ATOMIC")
}

/// Returns the label of a `label: BEGIN` line.
fn body_label(upper: &str) -> Option<String> {
    let mut tokens = upper.split_whitespace().rev();
    let last = tokens.next()?;
    let label = match last.strip_suffix(":BEGIN") {
        Some(label) => label,
        None if last == "BEGIN" => tokens.next()?.strip_suffix(':')?,
        None => return None,
    };
    (!label.is_empty()).then(|| label.to_string())
}

/// Returns whether an upper-cased line is `END <label>;`.
fn closes_labelled_body(upper: &str, label: &str) -> bool {
    let Some(body) = upper.strip_suffix(';') else {
        return false;
    };
    let mut tokens = body.split_whitespace().rev();
    tokens.next() == Some(label) && tokens.next() == Some("END")
}

/// Updates the open dollar-quote delimiter with every delimiter on the line.
///
/// Outside a dollar quote, `'...'` literals are skipped and `--` ends the
/// scan. Inside one, only the matching delimiter is looked for.
fn track_dollar_quotes(line: &str, open: &mut Option<String>) {
    let mut rest = line;
    loop {
        if let Some(current) = open.as_deref() {
            let Some(pos) = rest.find(current) else {
                return;
            };
            rest = &rest[pos + current.len()..];
            *open = None;
            continue;
        }

        let Some(pos) = rest.find(['$', '\'', '-']) else {
            return;
        };
        let tail = &rest[pos..];
        if tail.starts_with("--") {
            return;
        }
        if let Some(literal) = tail.strip_prefix('\'') {
            let Some(end) = literal.find('\'') else {
                return;
            };
            rest = &literal[end + 1..];
        } else if let Some(len) = dollar_delimiter_len(tail) {
            *open = Some(tail[..len].to_string());
            rest = &tail[len..];
        } else {
            rest = &tail[1..];
        }
    }
}

/// Length of a `$tag$` delimiter at the start of `text`, if there is one.
/// Positional parameters such as `$1` are not delimiters.
fn dollar_delimiter_len(text: &str) -> Option<usize> {
    let rest = text.strip_prefix('$')?;
    let end = rest.find('$')?;
    let tag = &rest[..end];
    let valid = tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !tag.starts_with(|c: char| c.is_ascii_digit());
    valid.then_some(end + 2)
}
