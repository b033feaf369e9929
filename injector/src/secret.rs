use indexmap::IndexMap;
use k8s_openapi::api::core::v1::Secret;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    error::InjectError,
    index::Indexes,
    manifest::name::{AUTH_CONFIG_KEY, AUTH_CONFIG_SECRET, SCRUBBED},
};

/// One backend array or cluster as the sidecar sees it. Extra fields a driver keeps alongside
/// these (e.g. `mdm`) are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub intended_endpoint: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(rename = "systemID", default)]
    pub system_id: String,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Json,
    Yaml,
}

impl PayloadFormat {
    pub fn encode<T: Serialize>(self, value: &T) -> anyhow::Result<Vec<u8>> {
        match self {
            PayloadFormat::Json => Ok(serde_json::to_vec(value)?),
            PayloadFormat::Yaml => Ok(serde_yaml::to_string(value)?.into_bytes()),
        }
    }
}

/// Decodes a credential payload as JSON, falling back to YAML. Reports both errors when neither
/// works.
pub fn decode_payload<T: DeserializeOwned>(
    what: &str,
    data: &[u8],
) -> anyhow::Result<(T, PayloadFormat)> {
    let json_err = match serde_json::from_slice(data) {
        Ok(value) => return Ok((value, PayloadFormat::Json)),
        Err(err) => err,
    };

    match serde_yaml::from_slice(data) {
        Ok(value) => Ok((value, PayloadFormat::Yaml)),
        Err(yaml_err) => Err(InjectError::decode(
            what,
            format!("yaml error: {yaml_err}, json error: {json_err}"),
        )
        .into()),
    }
}

/// The raw bytes stored under `key`, looking at `data` before `stringData`.
pub fn secret_data<'a>(secret: &'a Secret, key: &str) -> Option<&'a [u8]> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|bytes| bytes.0.as_slice())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(key))
                .map(|s| s.as_bytes())
        })
}

pub fn require_secret_data<'a>(secret: &'a Secret, key: &str) -> anyhow::Result<&'a [u8]> {
    secret_data(secret, key).ok_or_else(|| {
        let name = secret.metadata.name.as_deref().unwrap_or_default();
        InjectError::decode(format!("secret `{name}`"), format!("missing `{key}` key")).into()
    })
}

/// Records of an authorization config Secret left behind by an earlier run, if the input has
/// one.
pub fn previous_records(indexes: &Indexes) -> anyhow::Result<Vec<ConnectionRecord>> {
    let Some(secret) = indexes.secrets.get(AUTH_CONFIG_SECRET) else {
        return Ok(vec![]);
    };
    let Some(data) = secret_data(secret, AUTH_CONFIG_KEY) else {
        return Ok(vec![]);
    };
    serde_json::from_slice(data)
        .map_err(|err| InjectError::decode(format!("secret `{AUTH_CONFIG_SECRET}`"), err).into())
}

pub fn local_endpoint(port: u16) -> String {
    format!("https://localhost:{port}")
}

pub fn is_local(endpoint: &str) -> bool {
    endpoint.contains("localhost")
}

/// The port of a `scheme://host:port[/path]` endpoint.
pub fn endpoint_port(endpoint: &str) -> anyhow::Result<u16> {
    let authority = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest)
        .split('/')
        .next()
        .unwrap_or_default();
    authority
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse().ok())
        .ok_or_else(|| InjectError::decode("endpoint", format!("no port in `{endpoint}`")).into())
}

/// Points every record at the local sidecar and scrubs its credentials.
///
/// Records get consecutive ports from `start_port`. A record that is already local keeps its
/// port and new records are numbered after the highest port already held, wherever the local
/// records sit in the list. The intended endpoint of a local record is recovered from the record
/// of `previous` with the same endpoint, or failing that the one at the same position.
#[tracing::instrument(skip(records, previous), fields(records = records.len()))]
pub fn obfuscate(
    records: &[ConnectionRecord],
    start_port: u16,
    previous: &[ConnectionRecord],
) -> anyhow::Result<Vec<ConnectionRecord>> {
    let held = records
        .iter()
        .filter(|record| is_local(&record.endpoint))
        .map(|record| endpoint_port(&record.endpoint))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let mut port = match held.iter().max() {
        Some(&highest) => highest.checked_add(1).map(|next| next.max(start_port)),
        None => Some(start_port),
    };
    let mut out = Vec::with_capacity(records.len());

    for (i, record) in records.iter().enumerate() {
        let mut obfuscated = record.clone();
        obfuscated.username = SCRUBBED.to_string();
        obfuscated.password = SCRUBBED.to_string();

        if is_local(&record.endpoint) {
            let prev = previous
                .iter()
                .find(|prev| prev.endpoint == record.endpoint)
                .or_else(|| previous.get(i));
            if let Some(prev) = prev {
                obfuscated.intended_endpoint = prev.intended_endpoint.clone();
            }
            if obfuscated.intended_endpoint.is_empty() {
                return Err(InjectError::structural(
                    format!("endpoint `{}`", record.endpoint),
                    "already points at the sidecar but its intended endpoint is unknown",
                )
                .into());
            }
        } else {
            let assigned = port.ok_or_else(|| anyhow::anyhow!("ran out of local ports"))?;
            obfuscated.intended_endpoint = record.endpoint.clone();
            obfuscated.endpoint = local_endpoint(assigned);
            port = assigned.checked_add(1);
        }

        tracing::debug!(
            system_id = %obfuscated.system_id,
            endpoint = %obfuscated.endpoint,
            intended = %obfuscated.intended_endpoint,
            "obfuscated connection"
        );
        out.push(obfuscated);
    }

    Ok(out)
}
