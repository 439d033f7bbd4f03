//! Key decomposition: turns raw commit keys into row mutations.
//!
//! A [`Decomposer`] holds the tables a consumer materializes and an ordered
//! list of [`Rule`]s. Each rule is a key template such as
//! `state_au_{auId:int}_bid_{bidder}_{column}`. The first rule whose template
//! matches a key wins, so sub-entity rules must be listed before the
//! entity-level rule that would otherwise swallow their keys.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::commit::{Commit, CommitValue};
use crate::error::{Error, Result};
use crate::mutation::RowMutation;
use crate::schema::{is_identifier, TableSchema};
use crate::types::PrimaryKey;

/// Placeholder naming the target column inside a template.
pub const COLUMN_PLACEHOLDER: &str = "column";

/// What a rule does when a matched key carries the delete sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteAction {
    /// Remove the whole row.
    #[default]
    DeleteRow,
    /// Set only the addressed column to NULL.
    ClearColumn,
    /// Drop the commit.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureKind {
    /// Greedy `.+`.
    Any,
    /// Decimal digits.
    Int,
    /// Letters, digits and dashes.
    Word,
}

impl CaptureKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "" | "any" => Some(CaptureKind::Any),
            "int" => Some(CaptureKind::Int),
            "word" => Some(CaptureKind::Word),
            _ => None,
        }
    }

    fn regex(self) -> &'static str {
        match self {
            CaptureKind::Any => ".+",
            CaptureKind::Int => r"\d+",
            CaptureKind::Word => "[A-Za-z0-9-]+",
        }
    }
}

/// A compiled key template.
#[derive(Debug, Clone)]
pub struct KeyTemplate {
    source: String,
    regex: Regex,
    captures: Vec<String>,
}

impl KeyTemplate {
    /// Compile a template like `state_ex_{id:int}_{column}`.
    pub fn parse(template: &str) -> Result<Self> {
        let invalid = |message: String| Error::InvalidRule {
            rule: template.to_string(),
            message,
        };

        let mut pattern = String::from("^");
        let mut captures: Vec<String> = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            pattern.push_str(&regex::escape(&rest[..open]));
            let close = rest[open..]
                .find('}')
                .map(|i| open + i)
                .ok_or_else(|| invalid("unterminated '{'".into()))?;

            let spec = &rest[open + 1..close];
            let (name, kind) = match spec.split_once(':') {
                Some((name, kind)) => (name, kind),
                None => (spec, ""),
            };
            let kind = CaptureKind::parse(kind)
                .ok_or_else(|| invalid(format!("unknown capture kind '{}'", kind)))?;
            if !is_identifier(name) {
                return Err(invalid(format!("'{}' is not a valid capture name", name)));
            }
            if captures.iter().any(|c| c == name) {
                return Err(invalid(format!("capture '{}' appears twice", name)));
            }

            pattern.push_str(&format!("(?P<{}>{})", name, kind.regex()));
            captures.push(name.to_string());
            rest = &rest[close + 1..];
        }

        if rest.contains('}') {
            return Err(invalid("unmatched '}'".into()));
        }
        pattern.push_str(&regex::escape(rest));
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            source: template.to_string(),
            regex,
            captures,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn has_capture(&self, name: &str) -> bool {
        self.captures.iter().any(|c| c == name)
    }

    fn captures<'k>(&self, key: &'k str) -> Option<Captures<'k>> {
        self.regex.captures(key)
    }
}

/// One entry of the ordered rule table.
#[derive(Debug, Clone)]
pub struct Rule {
    pub template: KeyTemplate,
    pub table: String,
    /// Fixed target column, for templates without a `{column}` capture.
    pub column: Option<String>,
    /// Bookkeeping columns that are never mirrored.
    pub ignore: Vec<String>,
    pub on_delete: DeleteAction,
}

impl Rule {
    /// Create a builder for a rule matching the given template.
    pub fn builder(template: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(template)
    }

    fn target_column<'k>(&'k self, caps: &Captures<'k>) -> Option<&'k str> {
        match &self.column {
            Some(column) => Some(column.as_str()),
            None => caps.name(COLUMN_PLACEHOLDER).map(|m| m.as_str()),
        }
    }
}

/// Builder for a [`Rule`].
pub struct RuleBuilder {
    template: String,
    table: Option<String>,
    column: Option<String>,
    ignore: Vec<String>,
    on_delete: DeleteAction,
}

impl RuleBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            table: None,
            column: None,
            ignore: vec![],
            on_delete: DeleteAction::default(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn ignore(mut self, column: impl Into<String>) -> Self {
        self.ignore.push(column.into());
        self
    }

    pub fn on_delete(mut self, action: DeleteAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn build(self) -> Result<Rule> {
        let template = KeyTemplate::parse(&self.template)?;
        let table = self.table.ok_or_else(|| Error::InvalidRule {
            rule: self.template.clone(),
            message: "missing target table".into(),
        })?;

        Ok(Rule {
            template,
            table,
            column: self.column,
            ignore: self.ignore,
            on_delete: self.on_delete,
        })
    }
}

/// Reason a matched commit could not be turned into a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure(pub String);

/// Ordered rule table bound to the tables it writes.
#[derive(Debug, Clone)]
pub struct Decomposer {
    tables: Vec<TableSchema>,
    rules: Vec<(Rule, usize)>,
}

impl Decomposer {
    /// Bind rules to tables, checking that every rule can produce a full
    /// primary key and a column for its table.
    pub fn new(tables: Vec<TableSchema>, rules: Vec<Rule>) -> Result<Self> {
        let mut bound = Vec::with_capacity(rules.len());

        for rule in rules {
            let invalid = |message: String| Error::InvalidRule {
                rule: rule.template.as_str().to_string(),
                message,
            };

            let table_index = tables
                .iter()
                .position(|t| t.name == rule.table)
                .ok_or_else(|| invalid(format!("unknown table '{}'", rule.table)))?;
            let schema = &tables[table_index];

            for key in schema.key_names() {
                if !rule.template.has_capture(key) {
                    return Err(invalid(format!("key column '{}' is not captured", key)));
                }
            }

            for capture in &rule.template.captures {
                if capture != COLUMN_PLACEHOLDER && !schema.is_key_column(capture) {
                    return Err(invalid(format!(
                        "capture '{}' is not a key column of '{}'",
                        capture, schema.name
                    )));
                }
            }

            match (&rule.column, rule.template.has_capture(COLUMN_PLACEHOLDER)) {
                (Some(_), true) => {
                    return Err(invalid(
                        "fixed column conflicts with a {column} capture".into(),
                    ))
                }
                (None, false) => {
                    return Err(invalid("needs a {column} capture or a fixed column".into()))
                }
                (Some(column), false) if schema.column(column).is_none() => {
                    return Err(invalid(format!(
                        "column '{}' is not declared in '{}'",
                        column, schema.name
                    )))
                }
                _ => {}
            }

            bound.push((rule, table_index));
        }

        Ok(Self {
            tables,
            rules: bound,
        })
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|(rule, _)| rule)
    }

    /// Prune mutations for tables with a required column, run after
    /// every chunk.
    pub fn prunes(&self) -> impl Iterator<Item = RowMutation> + '_ {
        self.tables.iter().filter_map(|table| {
            table
                .required
                .as_ref()
                .map(|column| RowMutation::prune(table.name.clone(), column.clone()))
        })
    }

    /// Map a key/value pair to at most one row mutation.
    ///
    /// Keys that match no rule, columns the table does not declare and
    /// ignored bookkeeping columns all yield `Ok(None)`.
    pub fn decompose(
        &self,
        key: &str,
        value: &CommitValue,
    ) -> std::result::Result<Option<RowMutation>, DecodeFailure> {
        for (rule, table_index) in &self.rules {
            let Some(caps) = rule.template.captures(key) else {
                continue;
            };
            let schema = &self.tables[*table_index];
            return apply_rule(rule, schema, &caps, value);
        }
        Ok(None)
    }

    /// Decompose a commit, attaching its index to decode errors.
    pub fn decompose_commit(&self, commit: &Commit) -> Result<Option<RowMutation>> {
        self.decompose(&commit.key, &commit.value)
            .map_err(|DecodeFailure(message)| Error::Decode {
                index: commit.index,
                message: format!("key '{}': {}", commit.key, message),
            })
    }
}

fn apply_rule(
    rule: &Rule,
    schema: &TableSchema,
    caps: &Captures<'_>,
    value: &CommitValue,
) -> std::result::Result<Option<RowMutation>, DecodeFailure> {
    let Some(column) = rule.target_column(caps) else {
        return Ok(None);
    };
    if rule.ignore.iter().any(|c| c == column) {
        return Ok(None);
    }
    let Some(column_def) = schema.column(column) else {
        return Ok(None);
    };

    let mut key = Vec::with_capacity(schema.key.len());
    for key_column in &schema.key {
        let raw = caps
            .name(&key_column.name)
            .map(|m| m.as_str())
            .unwrap_or_default();
        let parsed = key_column
            .column_type
            .parse_key(raw)
            .map_err(|m| DecodeFailure(format!("key column '{}': {}", key_column.name, m)))?;
        key.push((key_column.name.clone(), parsed));
    }
    let key = PrimaryKey::new(key);

    if value.is_delete() {
        return Ok(match rule.on_delete {
            DeleteAction::DeleteRow => Some(RowMutation::delete(&schema.name, key)),
            DeleteAction::ClearColumn => Some(RowMutation::clear(&schema.name, key, column)),
            DeleteAction::Ignore => None,
        });
    }

    let cell = column_def
        .column_type
        .coerce(value)
        .map_err(|m| DecodeFailure(format!("column '{}': {}", column, m)))?;

    Ok(Some(RowMutation::upsert(&schema.name, key, column, cell)))
}
