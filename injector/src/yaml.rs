use serde::{Deserialize, de::DeserializeOwned};

use crate::error::InjectError;

pub fn from_slice<T>(s: &[u8]) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    serde_yaml::from_slice(s).map_err(Into::into)
}

pub fn to_string<T>(value: &T) -> anyhow::Result<String>
where
    T: serde::Serialize,
{
    serde_yaml::to_string(value).map_err(Into::into)
}

/// Splits a (possibly multi-document) YAML stream into its documents, skipping empty ones.
/// A malformed document fails the whole stream.
pub fn documents(s: &[u8]) -> anyhow::Result<Vec<serde_json::Value>> {
    let mut documents = vec![];
    for (i, document) in serde_yaml::Deserializer::from_slice(s).enumerate() {
        let value = serde_json::Value::deserialize(document)
            .map_err(|err| InjectError::decode(format!("YAML document {i}"), err))?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}
