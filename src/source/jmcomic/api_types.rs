//! Deserialization mirrors of the remote JSON payloads. The API is loose
//! about number/string types, so ids and sort keys go through tolerant
//! deserializers.

use serde::de::{Deserializer, Error as _};
use serde::Deserialize;

pub(crate) fn de_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "invalid type for string id: {other}"
        ))),
    }
}

pub(crate) fn de_string_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "invalid type for string field: {other}"
        ))),
    }
}

pub(crate) fn de_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    })
}

/// Outer `{code, data}` wrapper on every API response; `data` is a base64
/// string for encrypted endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiEnvelope {
    pub code: i64,
    #[serde(default)]
    pub error_msg: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// List-style album record (discovery and search).
#[derive(Debug, Deserialize)]
pub(crate) struct AlbumStub {
    #[serde(deserialize_with = "de_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchPayload {
    #[serde(default)]
    pub content: Vec<AlbumStub>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub total: Option<i64>,
}

/// Full album detail.
#[derive(Debug, Deserialize)]
pub(crate) struct Album {
    #[serde(deserialize_with = "de_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub series: Vec<SeriesEntry>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub addtime: Option<i64>,
}

/// One chapter row of an album's series list.
#[derive(Debug, Deserialize)]
pub(crate) struct SeriesEntry {
    #[serde(deserialize_with = "de_string")]
    pub id: String,
    #[serde(default, deserialize_with = "de_string_default")]
    pub sort: String,
    #[serde(default)]
    pub name: String,
}

/// Chapter payload with the page image file names.
#[derive(Debug, Deserialize)]
pub(crate) struct ChapterData {
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub name: String,
}
