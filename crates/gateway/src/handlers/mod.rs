//! API handlers module

pub mod health;
pub mod rag;
pub mod search;
pub mod status;
pub mod translate;

use serde::{Deserialize, Deserializer};

/// Document ids arrive as JSON numbers or strings; keep them as strings
pub(crate) fn ids_as_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Num(i64),
        Text(String),
    }

    let ids = Vec::<Id>::deserialize(deserializer)?;
    Ok(ids
        .into_iter()
        .map(|id| match id {
            Id::Num(n) => n.to_string(),
            Id::Text(s) => s.trim().to_string(),
        })
        .filter(|s| !s.is_empty())
        .collect())
}
