//! Structural checks applied to requests and engine proposals.
//!
//! This is not a SQL parser.  Statements are split into a flat
//! token stream (comments and string literals dropped) and only a handful of
//! shapes are inspected:
//!
//! - the first proposal statement must be `CREATE SCHEMA catalog.schema`;
//! - identifiers following `FROM`, `JOIN`, `INTO`, `TABLE`, `VIEW` and
//!   `UPDATE` must be written as `catalog.schema.table`;
//! - the proposal must rewrite exactly the queries it was given.

use std::collections::HashSet;

use thiserror::Error;

use crate::model::{DdlStatement, OptimizationRequest, OptimizationResult};

/// Longest statement excerpt quoted in an error message.
const EXCERPT_CHARS: usize = 120;

/// A structural rule broken by a request or an engine proposal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("proposal contains no DDL statements")]
    EmptyDdl,

    #[error("first DDL statement must be CREATE SCHEMA, got `{statement}`")]
    MissingSchemaCreation { statement: String },

    #[error("schema `{identifier}` must be written as catalog.schema")]
    UnqualifiedSchema { identifier: String },

    #[error("table reference `{identifier}` is not catalog.schema.table in `{statement}`")]
    UnqualifiedTable { identifier: String, statement: String },

    #[error("queryid `{0}` appears more than once")]
    DuplicateQueryId(String),

    #[error("queryid set differs from the request (missing: {missing:?}, unexpected: {unexpected:?})")]
    QueryIdMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
}

/// Check an incoming request before a task is created for it.
pub fn validate_request(request: &OptimizationRequest) -> Result<(), ValidationError> {
    if let Some(id) = request.duplicate_query_id() {
        return Err(ValidationError::DuplicateQueryId(id.to_owned()));
    }
    for ddl in &request.ddl {
        check_table_names(&ddl.statement)?;
    }
    for query in &request.queries {
        check_table_names(&query.query)?;
    }
    Ok(())
}

/// Check an engine proposal against the request that produced it.
pub fn validate_result(
    request: &OptimizationRequest,
    result: &OptimizationResult,
) -> Result<(), ValidationError> {
    check_schema_first(&result.ddl)?;
    for statement in result.ddl.iter().chain(&result.migrations) {
        check_table_names(&statement.statement)?;
    }
    for query in &result.queries {
        check_table_names(&query.query)?;
    }
    check_query_ids(request, result)
}

/// The first statement must create the target schema with a two-part name.
pub fn check_schema_first(ddl: &[DdlStatement]) -> Result<(), ValidationError> {
    let first = ddl.first().ok_or(ValidationError::EmptyDdl)?;
    let tokens = tokenize(&first.statement);

    let is_create_schema = matches!(
        tokens.as_slice(),
        [Token::Word(create), Token::Word(schema), ..]
            if create.eq_ignore_ascii_case("CREATE") && schema.eq_ignore_ascii_case("SCHEMA")
    );
    if !is_create_schema {
        return Err(ValidationError::MissingSchemaCreation {
            statement: excerpt(&first.statement),
        });
    }

    match name_after(&tokens, 2) {
        Some(name) if name.contains('.') => Ok(()),
        Some(name) => Err(ValidationError::UnqualifiedSchema {
            identifier: name.to_owned(),
        }),
        None => Err(ValidationError::UnqualifiedSchema {
            identifier: String::new(),
        }),
    }
}

/// Every table reference in `statement` must be `catalog.schema.table`.
pub fn check_table_names(statement: &str) -> Result<(), ValidationError> {
    let tokens = tokenize(statement);
    match table_references(&tokens)
        .into_iter()
        .find(|name| name.matches('.').count() < 2)
    {
        Some(name) => Err(ValidationError::UnqualifiedTable {
            identifier: name.to_owned(),
            statement: excerpt(statement),
        }),
        None => Ok(()),
    }
}

/// Result `queryid`s must equal the request's, without duplicates.
pub fn check_query_ids(
    request: &OptimizationRequest,
    result: &OptimizationResult,
) -> Result<(), ValidationError> {
    let expected = request.query_ids();
    let mut seen = HashSet::with_capacity(result.queries.len());
    for query in &result.queries {
        if !seen.insert(query.queryid.as_str()) {
            return Err(ValidationError::DuplicateQueryId(query.queryid.clone()));
        }
    }

    let mut missing: Vec<String> = expected.difference(&seen).map(|s| (*s).to_owned()).collect();
    let mut unexpected: Vec<String> = seen.difference(&expected).map(|s| (*s).to_owned()).collect();
    if missing.is_empty() && unexpected.is_empty() {
        return Ok(());
    }
    missing.sort();
    unexpected.sort();
    Err(ValidationError::QueryIdMismatch {
        missing,
        unexpected,
    })
}

// ── tokenizer ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Word(&'a str),
    Open,
    Close,
    Comma,
    Other,
}

fn is_word_byte(b: u8) -> bool {
    // Non-ASCII bytes are kept inside words so slices stay on char boundaries.
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'"' | b'`' | b'$') || b >= 0x80
}

fn tokenize(sql: &str) -> Vec<Token<'_>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = sql[i..].find('\n').map_or(bytes.len(), |n| i + n + 1);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
            }
            b'\'' => {
                i = sql[i + 1..].find('\'').map_or(bytes.len(), |n| i + 1 + n + 1);
            }
            b'(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            b',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            _ if is_word_byte(b) => {
                let start = i;
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    if matches!(bytes[i], b'"' | b'`') {
                        let quote = char::from(bytes[i]);
                        i = sql[i + 1..].find(quote).map_or(bytes.len(), |n| i + 1 + n + 1);
                    } else {
                        i += 1;
                    }
                }
                tokens.push(Token::Word(&sql[start..i]));
            }
            _ if b.is_ascii_whitespace() => i += 1,
            _ => {
                tokens.push(Token::Other);
                i += 1;
            }
        }
    }
    tokens
}

// ── table reference extraction ───────────────────────────────────────────────

/// Words that follow a table keyword but are not table names.
const NOT_A_TABLE: &[&str] = &[
    "SELECT", "WITH", "LATERAL", "UNNEST", "VALUES", "SET", "TABLE",
];

/// Words that end a `FROM a, b` list instead of aliasing the previous table.
const CLAUSE_KEYWORDS: &[&str] = &[
    "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "OUTER", "NATURAL", "ON",
    "USING", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "UNION", "EXCEPT", "INTERSECT",
    "WINDOW", "FETCH", "FOR", "TABLESAMPLE", "SET", "VALUES", "SELECT", "RETURNING", "LATERAL",
];

fn is_kw(word: &str, keyword: &str) -> bool {
    word.eq_ignore_ascii_case(keyword)
}

fn is_any_kw(word: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| is_kw(word, kw))
}

fn normalize(name: &str) -> String {
    name.trim_matches(|c| c == '"' || c == '`').to_ascii_lowercase()
}

/// Name following position `at`, skipping `IF [NOT] EXISTS`.
fn name_after<'a>(tokens: &[Token<'a>], at: usize) -> Option<&'a str> {
    let mut j = at;
    while let Some(Token::Word(w)) = tokens.get(j) {
        if is_kw(w, "IF") || is_kw(w, "NOT") || is_kw(w, "EXISTS") {
            j += 1;
        } else {
            break;
        }
    }
    match tokens.get(j) {
        Some(&Token::Word(name)) if !is_any_kw(name, NOT_A_TABLE) => Some(name),
        _ => None,
    }
}

/// Unqualified names bound by `WITH [RECURSIVE] name [(cols)] AS (…), …`.
///
/// Only a `WITH` followed by a name opens a binding list; `WITH (…)` table
/// properties and `CREATE TABLE x AS (…)` bind nothing.
fn cte_names(tokens: &[Token<'_>]) -> HashSet<String> {
    let mut names = HashSet::new();
    for (i, token) in tokens.iter().enumerate() {
        if matches!(token, Token::Word(w) if is_kw(w, "WITH")) {
            collect_bindings(tokens, i + 1, &mut names);
        }
    }
    names
}

fn collect_bindings(tokens: &[Token<'_>], start: usize, names: &mut HashSet<String>) {
    let mut j = start;
    if matches!(tokens.get(j), Some(Token::Word(w)) if is_kw(w, "RECURSIVE")) {
        j += 1;
    }
    loop {
        let Some(&Token::Word(name)) = tokens.get(j) else {
            return;
        };
        j += 1;
        if matches!(tokens.get(j), Some(Token::Open)) {
            let Some(close) = matching_close(tokens, j) else {
                return;
            };
            j = close + 1;
        }
        let binds = matches!(tokens.get(j), Some(Token::Word(w)) if is_kw(w, "AS"))
            && matches!(tokens.get(j + 1), Some(Token::Open));
        if !binds {
            return;
        }
        if !name.contains('.') {
            names.insert(normalize(name));
        }
        let Some(close) = matching_close(tokens, j + 1) else {
            return;
        };
        j = close + 1;
        if matches!(tokens.get(j), Some(Token::Comma)) {
            j += 1;
        } else {
            return;
        }
    }
}

fn matching_close(tokens: &[Token<'_>], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (k, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::Open => depth += 1,
            Token::Close => {
                depth -= 1;
                if depth == 0 {
                    return Some(k);
                }
            }
            _ => {}
        }
    }
    None
}

fn table_references<'a>(tokens: &[Token<'a>]) -> Vec<&'a str> {
    let ctes = cte_names(tokens);
    let mut refs = Vec::new();
    // One entry per open paren: `true` when it opens a sub-query.
    let mut scopes: Vec<bool> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Open => {
                let is_query = matches!(
                    tokens.get(i + 1),
                    Some(Token::Word(w)) if is_kw(w, "SELECT") || is_kw(w, "WITH")
                );
                scopes.push(is_query);
            }
            Token::Close => {
                scopes.pop();
            }
            Token::Word(w) if is_kw(w, "FROM") || is_kw(w, "JOIN") => {
                let in_query = scopes.last().copied().unwrap_or(true);
                let after_distinct =
                    i > 0 && matches!(tokens[i - 1], Token::Word(prev) if is_kw(prev, "DISTINCT"));
                if in_query && !after_distinct {
                    collect_from_list(tokens, i + 1, &ctes, &mut refs);
                }
            }
            Token::Word(w)
                if is_kw(w, "INTO")
                    || is_kw(w, "TABLE")
                    || is_kw(w, "VIEW")
                    || is_kw(w, "UPDATE") =>
            {
                if let Some(name) = name_after(tokens, i + 1) {
                    if !ctes.contains(&normalize(name)) {
                        refs.push(name);
                    }
                }
            }
            _ => {}
        }
    }
    refs
}

/// Collect `FROM a [AS x], b [y], …` starting at `start`.
fn collect_from_list<'a>(
    tokens: &[Token<'a>],
    start: usize,
    ctes: &HashSet<String>,
    refs: &mut Vec<&'a str>,
) {
    let mut j = start;
    loop {
        match tokens.get(j) {
            Some(&Token::Word(name)) if !is_any_kw(name, NOT_A_TABLE) => {
                let is_call = matches!(tokens.get(j + 1), Some(Token::Open));
                if !is_call && !ctes.contains(&normalize(name)) {
                    refs.push(name);
                }
                j += 1;
            }
            _ => return,
        }
        if matches!(tokens.get(j), Some(Token::Word(w)) if is_kw(w, "AS")) {
            j += 1;
        }
        if matches!(tokens.get(j), Some(Token::Word(w)) if !is_any_kw(w, CLAUSE_KEYWORDS)) {
            j += 1;
        }
        if matches!(tokens.get(j), Some(Token::Comma)) {
            j += 1;
        } else {
            return;
        }
    }
}

fn excerpt(statement: &str) -> String {
    let trimmed = statement.trim();
    match trimmed.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_owned(),
    }
}
