use serde_json::Value;

use super::{canonical_expr, canonical_value, Expr, Result};

/// Sort direction for a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One field of a sort specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

/// Ordered list of sort fields; earlier fields take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SortSpec {
    pub fields: Vec<SortField>,
}

impl SortSpec {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Canonical text, e.g. `"name" asc,"created" desc`.
    pub fn canonical_text(&self) -> String {
        self.fields
            .iter()
            .map(|f| {
                let dir = match f.direction {
                    SortDirection::Ascending => "asc",
                    SortDirection::Descending => "desc",
                };
                format!("{} {}", quoted(&f.field), dir)
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A predicate query with optional paging and sorting.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub predicate: Option<Expr>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub sort: SortSpec,
}

impl Query {
    /// A query returning every entity.
    pub fn all() -> Self {
        Self::default()
    }

    /// A query filtered by `predicate`.
    pub fn filter(predicate: Expr) -> Self {
        Self {
            predicate: Some(predicate),
            ..Self::default()
        }
    }

    pub fn skip(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn take(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.sort.fields.push(SortField {
            field: field.into(),
            direction: SortDirection::Ascending,
        });
        self
    }

    pub fn order_by_desc(mut self, field: impl Into<String>) -> Self {
        self.sort.fields.push(SortField {
            field: field.into(),
            direction: SortDirection::Descending,
        });
        self
    }

    /// Canonical text for this query under the given operation tag.
    ///
    /// A missing predicate and a predicate folding to `true` render the same.
    pub fn canonical_text(&self, operation: &str) -> Result<String> {
        Ok(format!(
            "{}|where={}|skip={}|take={}|order={}",
            operation,
            canonical_predicate(self.predicate.as_ref())?,
            optional(self.offset),
            optional(self.limit),
            self.sort.canonical_text(),
        ))
    }
}

/// Canonical text for an optional predicate; `*` matches everything.
pub fn canonical_predicate(predicate: Option<&Expr>) -> Result<String> {
    let text = match predicate {
        Some(expr) => canonical_expr(expr)?,
        None => return Ok("*".to_string()),
    };
    Ok(if text == "true" { "*".to_string() } else { text })
}

/// JSON-quoted, escaped form of a name.
fn quoted(text: &str) -> String {
    canonical_value(&Value::from(text))
}

fn optional(value: Option<usize>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// A named parameter of a raw command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandParam {
    pub name: String,
    pub value: Value,
}

/// A raw backend command with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub text: String,
    pub params: Vec<CommandParam>,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push(CommandParam {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Looks up a parameter value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    /// Canonical text: command text followed by parameters sorted by name.
    ///
    /// Parameter order as supplied by the caller never changes the result.
    pub fn canonical_text(&self) -> String {
        let mut params: Vec<(&str, String)> = self
            .params
            .iter()
            .map(|p| (p.name.as_str(), canonical_value(&p.value)))
            .collect();
        params.sort();
        let params = params
            .into_iter()
            .map(|(name, value)| format!("{}={}", quoted(name), value))
            .collect::<Vec<_>>()
            .join("&");
        format!("Execute|{}|{}", quoted(&self.text), params)
    }
}
