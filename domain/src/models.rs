use crate::error::{ClientError, ClientResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_TOP_K: usize = 5;

/// One ranked chunk returned by the similarity search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default, deserialize_with = "id_from_string_or_number")]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub filename: String,
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Result list after shape normalisation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedResults {
    pub results: Vec<SearchResult>,
    /// Array elements that were not result objects.
    pub skipped: usize,
}

/// Accepts a bare array, or an object wrapping the array under `results`
/// or `data`. Anything else is `MalformedResponseShape`.
pub fn normalize_search_response(payload: Value) -> ClientResult<NormalizedResults> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match (map.remove("results"), map.remove("data")) {
            (Some(Value::Array(items)), _) => items,
            (_, Some(Value::Array(items))) => items,
            _ => {
                return Err(ClientError::MalformedResponseShape(
                    "object without a `results` or `data` array".into(),
                ))
            }
        },
        other => {
            return Err(ClientError::MalformedResponseShape(format!(
                "expected array or object, got {}",
                kind_of(&other)
            )))
        }
    };

    let total = items.len();
    let results: Vec<SearchResult> = items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    let skipped = total - results.len();
    Ok(NormalizedResults { results, skipped })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A tool the backend exposes to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<Value>,
}
