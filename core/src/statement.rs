//! Cutting a classified command down to a single statement.
//!
//! The split is purely syntactic: it stops at the first `;` character wherever it
//! appears. A separator inside a string literal, a quoted identifier or a comment
//! is treated like any other, so `SELECT ';'` becomes `SELECT '`, which the
//! database then refuses as a syntax error. The same limitation means this is not
//! a complete defence against injection. It only guarantees that no second
//! statement follows the classified one inside a single execution call.

use std::fmt;

pub const STATEMENT_SEPARATOR: char = ';';

/// The prefix of a command before its first [`STATEMENT_SEPARATOR`].
///
/// Never contains the separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IsolatedStatement(String);

impl IsolatedStatement {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for IsolatedStatement {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IsolatedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn isolate(command: &str) -> IsolatedStatement {
    let head = match command.split_once(STATEMENT_SEPARATOR) {
        Some((head, _)) => head,
        None => command,
    };
    IsolatedStatement(head.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stacked_statement_is_dropped() {
        assert_eq!(
            isolate("SELECT * FROM t; DROP TABLE t").as_str(),
            "SELECT * FROM t"
        );
        assert_eq!(isolate("DELETE FROM t;;;").as_str(), "DELETE FROM t");
    }

    #[test]
    fn command_without_separator_is_kept_whole() {
        assert_eq!(isolate("SELECT 1").as_str(), "SELECT 1");
        assert_eq!(isolate("").as_str(), "");
    }

    #[test]
    fn leading_separator_yields_empty_statement() {
        assert_eq!(isolate(";DROP TABLE t").as_str(), "");
    }

    #[test]
    fn separator_inside_literal_still_splits() {
        assert_eq!(
            isolate("INSERT INTO t VALUES ('a;b')").as_str(),
            "INSERT INTO t VALUES ('a"
        );
        assert_eq!(isolate("SELECT 1 -- ; note").as_str(), "SELECT 1 -- ");
    }

    #[test]
    fn output_never_contains_separator_and_is_idempotent() {
        let samples = [
            "SELECT 1",
            "SELECT 1;",
            "a;b;c",
            ";",
            "UPDATE t SET x = 'é;'; DROP TABLE t",
            "no separator at all",
        ];
        for sample in samples {
            let once = isolate(sample);
            assert!(!once.as_str().contains(STATEMENT_SEPARATOR), "{sample}");
            assert!(sample.starts_with(once.as_str()));
            assert_eq!(isolate(once.as_str()), once);
        }
    }
}
