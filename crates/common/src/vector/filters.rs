//! Metadata filters rendered against the `meta` JSON column

use crate::errors::{AppError, Result};
use sea_orm::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    #[serde(alias = "==")]
    Eq,
    In,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub key: String,
    pub value: FilterValue,
    pub operator: FilterOperator,
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: FilterValue::One(value.into()),
            operator: FilterOperator::Eq,
        }
    }

    pub fn one_of<I, S>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            value: FilterValue::Many(values.into_iter().map(Into::into).collect()),
            operator: FilterOperator::In,
        }
    }

    fn render(&self, values: &mut Vec<Value>) -> Result<String> {
        let column = json_column(&self.key)?;

        let items: Vec<&String> = match &self.value {
            FilterValue::One(v) => vec![v],
            FilterValue::Many(vs) => vs.iter().collect(),
        };

        match self.operator {
            FilterOperator::Eq => {
                let [value] = items.as_slice() else {
                    return Err(AppError::validation(
                        format!("Filter on '{}' with == takes exactly one value", self.key),
                        Some("filters"),
                    ));
                };
                values.push((*value).clone().into());
                Ok(format!("{} = ?", column))
            }
            FilterOperator::In if items.is_empty() => Ok("1 = 0".to_string()),
            FilterOperator::In => {
                let placeholders = vec!["?"; items.len()].join(", ");
                values.extend(items.into_iter().map(|v| Value::from(v.clone())));
                Ok(format!("{} IN ({})", column, placeholders))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterCondition {
    #[default]
    And,
    Or,
}

impl FilterCondition {
    fn as_sql(&self) -> &'static str {
        match self {
            FilterCondition::And => " AND ",
            FilterCondition::Or => " OR ",
        }
    }
}

/// A set of filters combined with one condition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilters {
    pub filters: Vec<MetadataFilter>,
    #[serde(default)]
    pub condition: FilterCondition,
}

impl MetadataFilters {
    pub fn new(filters: Vec<MetadataFilter>, condition: FilterCondition) -> Self {
        Self { filters, condition }
    }

    /// `source == id` for each id, OR-ed together
    pub fn any_source<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            ids.into_iter().map(|id| MetadataFilter::eq("source", id)).collect(),
            FilterCondition::Or,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// SQL fragment with `?` placeholders plus its bound values.
    /// `None` when there is nothing to filter on.
    pub fn to_sql(&self) -> Result<Option<(String, Vec<Value>)>> {
        if self.filters.is_empty() {
            return Ok(None);
        }

        let mut values = Vec::new();
        let clauses = self
            .filters
            .iter()
            .map(|f| f.render(&mut values))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some((
            format!("({})", clauses.join(self.condition.as_sql())),
            values,
        )))
    }
}

/// JSON path expressions embed the key, so only plain identifiers pass
fn json_column(key: &str) -> Result<String> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::validation(
            format!("Invalid metadata key '{}'", key),
            Some("filters"),
        ));
    }
    Ok(format!("JSON_UNQUOTE(JSON_EXTRACT(meta, '$.{}'))", key))
}
