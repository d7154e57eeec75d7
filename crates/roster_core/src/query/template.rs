//! Query text with `:name` placeholders, and the bound form sent to SQLite.
//!
//! # Invariants
//! - Values only ever reach SQL as bound parameters.
//! - Placeholders inside quoted literals are left untouched.
//! - A sequence argument expands to `(?, ?, ...)`; an empty one to `(NULL)`,
//!   which matches no row.

use crate::query::error::QueryDerivationError;
use crate::store::error::{RepoError, RepoResult};
use rusqlite::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Scalar,
    /// Multi-value argument rendered as a containment list.
    Sequence,
}

/// One call-time argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Scalar(Value),
    Sequence(Vec<Value>),
}

impl Arg {
    pub fn scalar(value: impl Into<Value>) -> Self {
        Self::Scalar(value.into())
    }

    pub fn text(value: &str) -> Self {
        Self::Scalar(Value::Text(value.to_owned()))
    }

    pub fn null() -> Self {
        Self::Scalar(Value::Null)
    }

    pub fn sequence<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Sequence(values.into_iter().map(Into::into).collect())
    }

    pub fn texts<S: AsRef<str>>(values: &[S]) -> Self {
        Self::Sequence(
            values
                .iter()
                .map(|value| Value::Text(value.as_ref().to_owned()))
                .collect(),
        )
    }

    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Scalar(_) => ParamKind::Scalar,
            Self::Sequence(_) => ParamKind::Sequence,
        }
    }

    pub(crate) fn as_scalar(&self, name: &str) -> RepoResult<&Value> {
        match self {
            Self::Scalar(value) => Ok(value),
            Self::Sequence(_) => Err(RepoError::InvalidArgument(format!(
                "parameter `{name}` expects a single value, got a sequence"
            ))),
        }
    }
}

/// Arguments keyed by declared parameter name.
#[derive(Debug, Clone, Default)]
pub struct Bindings<'a> {
    entries: Vec<(&'a str, &'a Arg)>,
}

impl<'a> Bindings<'a> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(entries: Vec<(&'a str, &'a Arg)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> RepoResult<&'a Arg> {
        self.entries
            .iter()
            .find(|(bound, _)| *bound == name)
            .map(|(_, arg)| *arg)
            .ok_or_else(|| {
                RepoError::InvalidArgument(format!("no value bound for parameter `{name}`"))
            })
    }
}

/// Executable SQL with its positional values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundQuery {
    pub sql: String,
    pub values: Vec<Value>,
}

impl BoundQuery {
    pub fn new(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }

    pub(crate) fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub(crate) fn bind_value(&mut self, value: Value) {
        self.sql.push('?');
        self.values.push(value);
    }

    pub(crate) fn bind_arg(&mut self, arg: &Arg) {
        match arg {
            Arg::Scalar(value) => self.bind_value(value.clone()),
            Arg::Sequence(values) if values.is_empty() => self.sql.push_str("(NULL)"),
            Arg::Sequence(values) => {
                self.sql.push('(');
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        self.sql.push_str(", ");
                    }
                    self.bind_value(value.clone());
                }
                self.sql.push(')');
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Update,
    Delete,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Parsed query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl SqlTemplate {
    /// Parses `text`; `name` labels errors.
    pub fn parse(name: &str, text: &str) -> Result<Self, QueryDerivationError> {
        let malformed = |detail: &str| QueryDerivationError::MalformedQuery {
            name: name.to_string(),
            detail: detail.to_string(),
        };

        let source = text.trim().trim_end_matches(';').trim_end().to_string();
        if source.is_empty() {
            return Err(malformed("query text is empty"));
        }

        let chars: Vec<char> = source.chars().collect();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut quote: Option<char> = None;
        let mut index = 0;

        while index < chars.len() {
            let current = chars[index];
            if let Some(open) = quote {
                literal.push(current);
                if current == open {
                    quote = None;
                }
                index += 1;
                continue;
            }

            match current {
                '\'' | '"' => {
                    quote = Some(current);
                    literal.push(current);
                    index += 1;
                }
                '?' => {
                    return Err(malformed(
                        "positional `?` placeholders are not supported; use `:name`",
                    ));
                }
                ':' if starts_param(&chars, index) => {
                    let start = index + 1;
                    let mut end = start;
                    while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                    {
                        end += 1;
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Param(chars[start..end].iter().collect()));
                    index = end;
                }
                _ => {
                    literal.push(current);
                    index += 1;
                }
            }
        }

        if quote.is_some() {
            return Err(malformed("unterminated quoted literal"));
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { source, segments })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct placeholder names in order of first appearance.
    pub fn param_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Param(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    pub fn statement_kind(&self) -> StatementKind {
        let keyword = self
            .source
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        match keyword.as_str() {
            "SELECT" | "WITH" => StatementKind::Select,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            _ => StatementKind::Other,
        }
    }

    pub(crate) fn render_into(
        &self,
        query: &mut BoundQuery,
        bindings: &Bindings<'_>,
    ) -> RepoResult<()> {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => query.push_sql(text),
                Segment::Param(name) => query.bind_arg(bindings.get(name)?),
            }
        }
        Ok(())
    }

    pub fn render(&self, bindings: &Bindings<'_>) -> RepoResult<BoundQuery> {
        let mut query = BoundQuery::default();
        self.render_into(&mut query, bindings)?;
        Ok(query)
    }
}

fn starts_param(chars: &[char], index: usize) -> bool {
    let next_is_ident = chars
        .get(index + 1)
        .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_');
    let after_colon = index > 0 && chars[index - 1] == ':';
    next_is_ident && !after_colon
}
