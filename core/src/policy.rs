//! Statement categories and their keyword allow-lists.
//!
//! Classification is coarse and lexical: a command is accepted by a table when it
//! *starts with* one of the table's keywords, compared case-insensitively. Nothing
//! after the keyword is inspected here; trailing statements are cut off by
//! [`crate::statement::isolate`].
//!
//! Keywords that are absent from every table on purpose:
//!
//! - `PREPARE` / `EXECUTE` / `DEALLOCATE`: they bypass one-statement-per-request.
//! - `BEGIN` / `START TRANSACTION` / `COMMIT` / `ROLLBACK` / `ABORT` / `SAVEPOINT` /
//!   `RELEASE SAVEPOINT` / `LOCK`: every request is its own transaction, and the
//!   connection is shared between requests.
//! - `DECLARE` / `CLOSE` / `FETCH` / `MOVE`: the cursor belongs to the gate.
//! - `GRANT` / `REVOKE` / `REASSIGN OWNED`: role management.
//! - `CHECKPOINT`, `COPY`, `DO`, `LOAD`, `SECURITY LABEL`: superuser-only,
//!   file based, or arbitrary code.
//! - `LISTEN` / `NOTIFY` / `UNLISTEN`: callbacks would leak into other requests.
//!
//! None of these may ever be added to a table.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const READ_ONLY_KEYWORDS: &[&str] = &["ANALYZE", "EXPLAIN", "SELECT", "SHOW", "VALUES"];
const MODIFYING_KEYWORDS: &[&str] = &[
    "ALTER", "CLUSTER", "REINDEX", "RESET", "SET", "UPDATE", "VACUUM",
];
const ADDITIVE_KEYWORDS: &[&str] = &["CREATE", "INSERT"];
const DESTRUCTIVE_KEYWORDS: &[&str] = &["DELETE", "DROP", "TRUNCATE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementCategory {
    ReadOnly,
    Modifying,
    Additive,
    Destructive,
}

impl StatementCategory {
    pub const ALL: [StatementCategory; 4] = [
        StatementCategory::ReadOnly,
        StatementCategory::Modifying,
        StatementCategory::Additive,
        StatementCategory::Destructive,
    ];

    /// Keywords of this category, in the order they are tried.
    pub const fn keywords(self) -> &'static [&'static str] {
        match self {
            StatementCategory::ReadOnly => READ_ONLY_KEYWORDS,
            StatementCategory::Modifying => MODIFYING_KEYWORDS,
            StatementCategory::Additive => ADDITIVE_KEYWORDS,
            StatementCategory::Destructive => DESTRUCTIVE_KEYWORDS,
        }
    }

    /// Mutating categories run inside a transaction that is committed or rolled back.
    pub const fn is_mutating(self) -> bool {
        !matches!(self, StatementCategory::ReadOnly)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            StatementCategory::ReadOnly => "read_only",
            StatementCategory::Modifying => "modifying",
            StatementCategory::Additive => "additive",
            StatementCategory::Destructive => "destructive",
        }
    }
}

impl fmt::Display for StatementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
struct KeywordMatcher {
    keyword: &'static str,
    regex: Regex,
}

impl KeywordMatcher {
    fn compile(keyword: &'static str) -> Result<Self> {
        let regex = RegexBuilder::new(&format!("^{}", regex::escape(keyword)))
            .case_insensitive(true)
            .build()
            .map_err(|err| {
                Error::InvalidConfig(format!("invalid keyword pattern {keyword:?}: {err}"))
            })?;
        Ok(Self { keyword, regex })
    }
}

/// An ordered allow-list of keyword matchers for one category.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    category: StatementCategory,
    matchers: Vec<KeywordMatcher>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification<'a> {
    Accepted {
        command: &'a str,
        keyword: &'static str,
    },
    Rejected {
        command: &'a str,
    },
}

impl Classification<'_> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Classification::Accepted { .. })
    }
}

impl PolicyTable {
    pub fn compile(category: StatementCategory) -> Result<Self> {
        let matchers = category
            .keywords()
            .iter()
            .copied()
            .map(KeywordMatcher::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { category, matchers })
    }

    pub fn category(&self) -> StatementCategory {
        self.category
    }

    pub fn keywords(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.matchers.iter().map(|matcher| matcher.keyword)
    }

    /// First-match-wins over the table's keywords, anchored at the start of `command`.
    ///
    /// A rejected command is handed back untouched so callers can echo it.
    pub fn classify<'a>(&self, command: &'a str) -> Classification<'a> {
        match self
            .matchers
            .iter()
            .find(|matcher| matcher.regex.is_match(command))
        {
            Some(matcher) => Classification::Accepted {
                command,
                keyword: matcher.keyword,
            },
            None => Classification::Rejected { command },
        }
    }
}

/// The four tables, compiled once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct PolicyTables {
    read_only: PolicyTable,
    modifying: PolicyTable,
    additive: PolicyTable,
    destructive: PolicyTable,
}

impl PolicyTables {
    pub fn compile() -> Result<Self> {
        Ok(Self {
            read_only: PolicyTable::compile(StatementCategory::ReadOnly)?,
            modifying: PolicyTable::compile(StatementCategory::Modifying)?,
            additive: PolicyTable::compile(StatementCategory::Additive)?,
            destructive: PolicyTable::compile(StatementCategory::Destructive)?,
        })
    }

    pub fn table(&self, category: StatementCategory) -> &PolicyTable {
        match category {
            StatementCategory::ReadOnly => &self.read_only,
            StatementCategory::Modifying => &self.modifying,
            StatementCategory::Additive => &self.additive,
            StatementCategory::Destructive => &self.destructive,
        }
    }
}

pub fn classify<'a>(command: &'a str, table: &PolicyTable) -> Classification<'a> {
    table.classify(command)
}
