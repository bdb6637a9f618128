//! SQL safety gate for model-generated statements.
//!
//! Every candidate statement passes through [`QueryGuard::validate`] before
//! it can reach a database. The check is lexical and structural: a small
//! tokenizer plus keyword denylist and function whitelist, not a SQL parser.
//! Anything the tokenizer cannot classify unambiguously across the supported
//! dialects is rejected.
//!
//! The only rewrite the guard performs is appending a `LIMIT` when the
//! statement has none at the top level. The injected limit is one row above
//! the cap so the executor can tell a capped result from a complete one.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::config::GuardConfig;
use crate::types::SchemaCatalog;

/// Keywords that may not appear as standalone tokens anywhere.
pub const DENIED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "GRANT", "REVOKE",
    "EXEC", "CALL", "MERGE", "EXECUTE", "INTO", "ATTACH", "DETACH", "PRAGMA", "COPY",
];

/// Functions a statement may call.
pub const ALLOWED_FUNCTIONS: &[&str] = &[
    "SUM", "AVG", "COUNT", "MAX", "MIN", "ROUND", "COALESCE", "CAST", "DATE_TRUNC", "EXTRACT",
    "NOW", "LOWER", "UPPER", "CONCAT", "LENGTH",
];

/// Keywords that are followed by `(` without being function calls.
const STRUCTURAL_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "JOIN", "ON", "USING", "AS", "AND", "OR", "NOT", "IN", "EXISTS",
    "ANY", "ALL", "SOME", "UNION", "INTERSECT", "EXCEPT", "DISTINCT", "BY", "HAVING", "CASE",
    "WHEN", "THEN", "ELSE", "IS", "LIKE", "BETWEEN", "LIMIT", "OFFSET", "OVER", "FILTER",
    "WITHIN", "VALUES", "LATERAL",
];

/// Type names that take parameters, e.g. `CAST(x AS VARCHAR(10))`.
const PARAMETERIZED_TYPES: &[&str] = &[
    "VARCHAR", "CHAR", "CHARACTER", "NCHAR", "NVARCHAR", "VARYING", "DECIMAL", "NUMERIC",
    "FLOAT", "TIMESTAMP", "TIME", "DATETIME", "INTERVAL", "BIT", "BINARY", "VARBINARY",
];

// =============================================================================
// Query types
// =============================================================================

/// Untrusted SQL text plus the schema it was generated against.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub sql: String,
    pub schema: Option<Arc<SchemaCatalog>>,
}

impl CandidateQuery {
    pub fn new(sql: impl Into<String>, schema: Arc<SchemaCatalog>) -> Self {
        Self {
            sql: sql.into(),
            schema: Some(schema),
        }
    }

    /// A candidate with no schema snapshot attached (ad-hoc validation).
    pub fn unscoped(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            schema: None,
        }
    }
}

/// Kind of statement a validated query holds. Only reads exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Select => write!(f, "SELECT"),
        }
    }
}

/// A statement that satisfied the read-only policy.
///
/// Only [`QueryGuard::validate`] constructs this type, so holding one is
/// proof the text is a single SELECT calling whitelisted functions.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedQuery {
    sql: String,
    statement_kind: StatementKind,
    functions: BTreeSet<String>,
    limit_injected: bool,
    schema: Option<Arc<SchemaCatalog>>,
}

impl ValidatedQuery {
    /// Text to execute, including an injected LIMIT if there was one.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn statement_kind(&self) -> StatementKind {
        self.statement_kind
    }

    /// Upper-cased names of every function the statement calls.
    pub fn functions(&self) -> &BTreeSet<String> {
        &self.functions
    }

    pub fn limit_injected(&self) -> bool {
        self.limit_injected
    }

    pub fn schema(&self) -> Option<&SchemaCatalog> {
        self.schema.as_deref()
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Why a statement was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsafeReason {
    EmptyStatement,
    NotSelect,
    KeywordNotAllowed,
    FunctionNotAllowed,
    QualifiedFunction,
    StackedStatements,
    UnterminatedLiteral,
    UnterminatedComment,
    AmbiguousLexeme,
    UnbalancedParentheses,
}

impl fmt::Display for UnsafeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnsafeReason::EmptyStatement => "empty statement",
            UnsafeReason::NotSelect => "statement must begin with SELECT",
            UnsafeReason::KeywordNotAllowed => "keyword not allowed",
            UnsafeReason::FunctionNotAllowed => "function not allowed",
            UnsafeReason::QualifiedFunction => "qualified function call not allowed",
            UnsafeReason::StackedStatements => "multiple statements not allowed",
            UnsafeReason::UnterminatedLiteral => "unterminated quoted literal",
            UnsafeReason::UnterminatedComment => "unterminated block comment",
            UnsafeReason::AmbiguousLexeme => "ambiguous lexeme",
            UnsafeReason::UnbalancedParentheses => "unbalanced parentheses",
        };
        f.write_str(text)
    }
}

/// Rejection raised by the guard. Never downgraded to a warning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsafe query: {}{}", .reason, .detail.as_ref().map(|d| format!(" ({})", d)).unwrap_or_default())]
pub struct UnsafeQueryError {
    pub reason: UnsafeReason,
    /// Offending keyword, function name or lexeme, when there is one.
    pub detail: Option<String>,
}

impl UnsafeQueryError {
    fn new(reason: UnsafeReason) -> Self {
        Self {
            reason,
            detail: None,
        }
    }

    fn with_detail(reason: UnsafeReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: Some(detail.into()),
        }
    }

    /// Name of the rejected function, for `FunctionNotAllowed` errors.
    pub fn function(&self) -> Option<&str> {
        match self.reason {
            UnsafeReason::FunctionNotAllowed | UnsafeReason::QualifiedFunction => {
                self.detail.as_deref()
            }
            _ => None,
        }
    }
}

// =============================================================================
// Guard
// =============================================================================

/// Read-only policy enforcer for candidate SQL.
#[derive(Debug, Clone)]
pub struct QueryGuard {
    row_cap: usize,
    allowed_functions: HashSet<String>,
}

impl Default for QueryGuard {
    fn default() -> Self {
        Self::new(&GuardConfig::default())
    }
}

impl QueryGuard {
    pub fn new(config: &GuardConfig) -> Self {
        let mut allowed_functions: HashSet<String> =
            ALLOWED_FUNCTIONS.iter().map(|f| f.to_string()).collect();
        for extra in &config.extra_allowed_functions {
            allowed_functions.insert(extra.trim().to_ascii_uppercase());
        }
        Self {
            row_cap: config.row_cap,
            allowed_functions,
        }
    }

    pub fn row_cap(&self) -> usize {
        self.row_cap
    }

    /// LIMIT value appended to statements without one: `row_cap + 1`.
    pub fn injected_limit(&self) -> usize {
        self.row_cap.saturating_add(1)
    }

    /// Validate a candidate, returning the statement to execute.
    pub fn validate(&self, candidate: &CandidateQuery) -> Result<ValidatedQuery, UnsafeQueryError> {
        let sql = candidate.sql.as_str();
        let tokens = tokenize(sql)?;

        // Statement stacking: a semicolon may only be the final token.
        if let Some(pos) = tokens.iter().position(|t| t.is_punct(';')) {
            if pos + 1 < tokens.len() {
                return Err(UnsafeQueryError::new(UnsafeReason::StackedStatements));
            }
        }
        let body = match tokens.last() {
            Some(t) if t.is_punct(';') => &tokens[..tokens.len() - 1],
            _ => &tokens[..],
        };
        if body.is_empty() {
            return Err(UnsafeQueryError::new(UnsafeReason::EmptyStatement));
        }

        check_parentheses(body)?;

        let leading = body.iter().find(|t| !t.is_punct('('));
        match leading {
            Some(t) if t.is_word("SELECT") => {}
            _ => return Err(UnsafeQueryError::new(UnsafeReason::NotSelect)),
        }

        for token in body {
            if token.kind == TokenKind::Word {
                let upper = token.text.to_ascii_uppercase();
                if DENIED_KEYWORDS.contains(&upper.as_str()) {
                    return Err(UnsafeQueryError::with_detail(
                        UnsafeReason::KeywordNotAllowed,
                        upper,
                    ));
                }
            }
        }

        let functions = self.collect_functions(body)?;

        let (sql, limit_injected) = if has_top_level_limit(body) {
            (sql.to_string(), false)
        } else {
            // Insert right after the last significant token so trailing
            // comments and the optional semicolon stay behind it.
            let end = body[body.len() - 1].end;
            let rewritten = format!(
                "{} LIMIT {}{}",
                &sql[..end],
                self.injected_limit(),
                &sql[end..]
            );
            (rewritten, true)
        };

        Ok(ValidatedQuery {
            sql,
            statement_kind: StatementKind::Select,
            functions,
            limit_injected,
            schema: candidate.schema.clone(),
        })
    }

    /// Validate bare SQL text with no schema snapshot.
    pub fn validate_sql(&self, sql: &str) -> Result<ValidatedQuery, UnsafeQueryError> {
        self.validate(&CandidateQuery::unscoped(sql))
    }

    fn collect_functions(&self, body: &[Token<'_>]) -> Result<BTreeSet<String>, UnsafeQueryError> {
        let mut functions = BTreeSet::new();
        for (i, token) in body.iter().enumerate() {
            let followed_by_paren = body.get(i + 1).is_some_and(|t| t.is_punct('('));
            if !followed_by_paren {
                continue;
            }
            let name = match token.kind {
                TokenKind::Word => token.text.to_ascii_uppercase(),
                TokenKind::QuotedIdent => unquote(token.text).to_ascii_uppercase(),
                _ => continue,
            };
            let previous = if i > 0 { body.get(i - 1) } else { None };

            if token.kind == TokenKind::Word {
                if STRUCTURAL_KEYWORDS.contains(&name.as_str()) {
                    continue;
                }
                if previous.is_some_and(|p| p.is_word("AS"))
                    && PARAMETERIZED_TYPES.contains(&name.as_str())
                {
                    continue;
                }
            }
            if previous.is_some_and(|p| p.is_punct('.')) {
                return Err(UnsafeQueryError::with_detail(
                    UnsafeReason::QualifiedFunction,
                    name,
                ));
            }
            if !self.allowed_functions.contains(&name) {
                return Err(UnsafeQueryError::with_detail(
                    UnsafeReason::FunctionNotAllowed,
                    name,
                ));
            }
            functions.insert(name);
        }
        Ok(functions)
    }
}

fn check_parentheses(body: &[Token<'_>]) -> Result<(), UnsafeQueryError> {
    let mut depth: usize = 0;
    for token in body {
        if token.is_punct('(') {
            depth += 1;
        } else if token.is_punct(')') {
            depth = depth
                .checked_sub(1)
                .ok_or_else(|| UnsafeQueryError::new(UnsafeReason::UnbalancedParentheses))?;
        }
    }
    if depth != 0 {
        return Err(UnsafeQueryError::new(UnsafeReason::UnbalancedParentheses));
    }
    Ok(())
}

/// True if a LIMIT or FETCH FIRST/NEXT clause exists outside any parentheses.
fn has_top_level_limit(body: &[Token<'_>]) -> bool {
    let mut depth = 0usize;
    for (i, token) in body.iter().enumerate() {
        if token.is_punct('(') {
            depth += 1;
        } else if token.is_punct(')') {
            depth = depth.saturating_sub(1);
        } else if depth == 0 {
            if token.is_word("LIMIT") {
                return true;
            }
            if token.is_word("FETCH")
                && body
                    .get(i + 1)
                    .is_some_and(|n| n.is_word("FIRST") || n.is_word("NEXT"))
            {
                return true;
            }
        }
    }
    false
}

fn unquote(text: &str) -> String {
    let mut chars = text.chars();
    let quote = match chars.next() {
        Some(q) => q,
        None => return String::new(),
    };
    let inner = &text[quote.len_utf8()..text.len().saturating_sub(quote.len_utf8())];
    let doubled: String = [quote, quote].iter().collect();
    inner.replace(&doubled, &quote.to_string())
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    QuotedIdent,
    StringLit,
    Number,
    Punct(char),
}

#[derive(Debug, Clone)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
    /// Byte offset one past the token's last character.
    end: usize,
}

impl Token<'_> {
    fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }

    fn is_word(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }
}

/// Split SQL into tokens, dropping whitespace and comments.
///
/// Rejects lexemes whose meaning differs between the supported dialects:
/// backslashes in or outside quotes, `$`-prefixed tokens, `#` comments,
/// `--` not followed by whitespace (MySQL reads `--1` as `- -1`),
/// `/*!` executable comments, nested block comments (Postgres nests them)
/// and bracket identifiers.
fn tokenize(sql: &str) -> Result<Vec<Token<'_>>, UnsafeQueryError> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let len = chars.len();
    let offset_at = |idx: usize| if idx < len { chars[idx].0 } else { sql.len() };

    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let c = chars[i].1;
        let next = chars.get(i + 1).map(|&(_, n)| n);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Line comment.
        if c == '-' && next == Some('-') {
            match chars.get(i + 2).map(|&(_, n)| n) {
                Some(after) if after.is_whitespace() => {}
                _ => {
                    return Err(UnsafeQueryError::with_detail(
                        UnsafeReason::AmbiguousLexeme,
                        "--",
                    ));
                }
            }
            while i < len && chars[i].1 != '\n' {
                i += 1;
            }
            continue;
        }

        // Block comment.
        if c == '/' && next == Some('*') {
            if chars.get(i + 2).map(|&(_, n)| n) == Some('!') {
                return Err(UnsafeQueryError::with_detail(
                    UnsafeReason::AmbiguousLexeme,
                    "/*!",
                ));
            }
            i += 2;
            loop {
                if i + 1 >= len {
                    return Err(UnsafeQueryError::new(UnsafeReason::UnterminatedComment));
                }
                if chars[i].1 == '*' && chars[i + 1].1 == '/' {
                    i += 2;
                    break;
                }
                if chars[i].1 == '/' && chars[i + 1].1 == '*' {
                    return Err(UnsafeQueryError::with_detail(
                        UnsafeReason::AmbiguousLexeme,
                        "nested /*",
                    ));
                }
                i += 1;
            }
            continue;
        }

        let start = i;
        let kind = match c {
            '\'' | '"' | '`' => {
                i = scan_quoted(&chars, i)?;
                if c == '\'' {
                    TokenKind::StringLit
                } else {
                    TokenKind::QuotedIdent
                }
            }
            '$' | '#' | '\\' | '[' | ']' => {
                return Err(UnsafeQueryError::with_detail(
                    UnsafeReason::AmbiguousLexeme,
                    c.to_string(),
                ));
            }
            _ if c.is_alphabetic() || c == '_' => {
                while i < len
                    && (chars[i].1.is_alphanumeric() || chars[i].1 == '_' || chars[i].1 == '$')
                {
                    i += 1;
                }
                TokenKind::Word
            }
            _ if c.is_ascii_digit() => {
                while i < len && (chars[i].1.is_alphanumeric() || chars[i].1 == '.' || chars[i].1 == '_')
                {
                    i += 1;
                }
                TokenKind::Number
            }
            _ => {
                i += 1;
                TokenKind::Punct(c)
            }
        };

        let (from, to) = (offset_at(start), offset_at(i));
        tokens.push(Token {
            kind,
            text: &sql[from..to],
            end: to,
        });
    }

    Ok(tokens)
}

/// Scan a quoted token starting at `start`; returns the index past its
/// closing quote. A doubled quote character is an escaped quote.
fn scan_quoted(chars: &[(usize, char)], start: usize) -> Result<usize, UnsafeQueryError> {
    let quote = chars[start].1;
    let mut i = start + 1;
    loop {
        match chars.get(i).map(|&(_, c)| c) {
            None => return Err(UnsafeQueryError::new(UnsafeReason::UnterminatedLiteral)),
            Some('\\') => {
                return Err(UnsafeQueryError::with_detail(
                    UnsafeReason::AmbiguousLexeme,
                    "\\",
                ));
            }
            Some(c) if c == quote => {
                if chars.get(i + 1).map(|&(_, n)| n) == Some(quote) {
                    i += 2;
                } else {
                    return Ok(i + 1);
                }
            }
            Some(_) => i += 1,
        }
    }
}
