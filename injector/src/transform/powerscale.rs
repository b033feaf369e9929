use indexmap::IndexMap;
use k8s_openapi::{ByteString, api::core::v1::Secret};
use serde::{Deserialize, Serialize};

use super::{Context, Transformer};
use crate::{
    manifest::name::{AUTH_CONFIG_KEY, SCRUBBED},
    resource::Resource,
    reslist::List,
    secret::{self, ConnectionRecord, PayloadFormat},
    serde_ex,
};

const CONFIG_PARAMS_VOLUME: &str = "csi-isilon-config-params";
const DEFAULT_ENDPOINT_PORT: u16 = 8080;

/// Drivers configured with a list of named clusters. The driver keeps reading its own Secret,
/// which is rewritten in place to point at the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerScale;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IsilonCreds {
    #[serde(default)]
    isilon_clusters: Vec<IsilonCluster>,
    #[serde(flatten)]
    rest: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IsilonCluster {
    #[serde(default)]
    cluster_name: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endpoint_port: Option<Port>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mount_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    skip_certificate_validation: Option<bool>,
    #[serde(flatten)]
    rest: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Port(#[serde(with = "serde_ex::string")] u16);

impl IsilonCluster {
    fn port(&self) -> u16 {
        self.endpoint_port.map_or(DEFAULT_ENDPOINT_PORT, |Port(port)| port)
    }

    /// The cluster as a connection record. Clusters already pointing at the sidecar keep their
    /// local endpoint so that the earlier assignment is reused.
    fn record(&self) -> ConnectionRecord {
        let endpoint = if secret::is_local(&self.endpoint) {
            secret::local_endpoint(self.port())
        } else {
            format!("https://{}:{}", self.endpoint, self.port())
        };
        ConnectionRecord {
            username: self.username.clone(),
            password: self.password.clone(),
            endpoint,
            system_id: self.cluster_name.clone(),
            insecure: self.skip_certificate_validation.unwrap_or_default(),
            is_default: self.is_default.unwrap_or_default(),
            ..Default::default()
        }
    }

    /// The cluster as the driver should see it once the sidecar is in place.
    fn obfuscated(&self, local: &ConnectionRecord) -> anyhow::Result<Self> {
        if secret::is_local(&self.endpoint) {
            return Ok(self.clone());
        }
        Ok(Self {
            username: SCRUBBED.to_string(),
            password: SCRUBBED.to_string(),
            endpoint: "localhost".to_string(),
            endpoint_port: Some(Port(secret::endpoint_port(&local.endpoint)?)),
            mount_endpoint: Some(self.endpoint.clone()),
            ..self.clone()
        })
    }
}

impl Transformer for PowerScale {
    #[tracing::instrument(skip_all, name = "powerscale", fields(namespace = cx.namespace))]
    fn transform(&self, cx: &Context<'_>) -> anyhow::Result<List> {
        let mut modified = List::default();
        modified.push(cx.root_certificate_secret()?);

        if let Some((name, source)) = cx.credential_secret()? {
            let data = secret::require_secret_data(source, AUTH_CONFIG_KEY)?;
            let (creds, format) =
                secret::decode_payload::<IsilonCreds>(&format!("secret `{name}`"), data)?;
            tracing::debug!(?format, clusters = creds.isilon_clusters.len(), "decoded credentials");

            let records = creds
                .isilon_clusters
                .iter()
                .map(IsilonCluster::record)
                .collect::<Vec<_>>();
            let previous = secret::previous_records(cx.indexes)?;
            let obfuscated = secret::obfuscate(&records, cx.start_port, &previous)?;

            let clusters = creds
                .isilon_clusters
                .iter()
                .zip(&obfuscated)
                .map(|(cluster, local)| cluster.obfuscated(local))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let creds = IsilonCreds {
                isilon_clusters: clusters,
                ..creds
            };

            modified.push(Resource::from_object(&rewrite_credentials(source, &creds, format)?)?);
            modified.push(cx.authorization_secret(source, &obfuscated)?);
        }

        let sidecar = cx.sidecar(CONFIG_PARAMS_VOLUME);
        if let Some(deployment) = cx.deployment()? {
            modified.push(Resource::from_object(&sidecar.inject(deployment, true)?)?);
        }
        if let Some(daemon_set) = cx.daemon_set()? {
            modified.push(Resource::from_object(&sidecar.inject(daemon_set, false)?)?);
        }

        Ok(modified)
    }
}

/// A copy of the driver's Secret carrying `creds`, encoded the way the original was.
fn rewrite_credentials(
    source: &Secret,
    creds: &IsilonCreds,
    format: PayloadFormat,
) -> anyhow::Result<Secret> {
    let mut secret = source.clone();
    if let Some(string_data) = secret.string_data.as_mut() {
        string_data.remove(AUTH_CONFIG_KEY);
    }
    secret
        .data
        .get_or_insert_with(Default::default)
        .insert(AUTH_CONFIG_KEY.to_string(), ByteString(format.encode(creds)?));
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREDS: &str = r#"
isilonClusters:
  - clusterName: cluster1
    username: admin
    password: secret
    endpoint: 10.0.0.1
    endpointPort: "8080"
    isDefault: true
    isiPath: /ifs/data/csi
  - clusterName: cluster2
    username: admin
    password: secret
    endpoint: 10.0.0.2
    skipCertificateValidation: true
"#;

    #[test]
    fn builds_records_with_default_port() -> anyhow::Result<()> {
        let (creds, format) = secret::decode_payload::<IsilonCreds>("creds", CREDS.as_bytes())?;
        assert_eq!(format, PayloadFormat::Yaml);

        let records = creds.isilon_clusters.iter().map(IsilonCluster::record).collect::<Vec<_>>();
        assert_eq!(records[0].endpoint, "https://10.0.0.1:8080");
        assert_eq!(records[0].system_id, "cluster1");
        assert!(records[0].is_default);
        assert_eq!(records[1].endpoint, "https://10.0.0.2:8080");
        assert!(records[1].insecure);
        Ok(())
    }

    #[test]
    fn accepts_numeric_ports() -> anyhow::Result<()> {
        let (creds, format) = secret::decode_payload::<IsilonCreds>(
            "creds",
            br#"{"isilonClusters":[{"clusterName":"c","endpoint":"1.2.3.4","endpointPort":443}]}"#,
        )?;
        assert_eq!(format, PayloadFormat::Json);
        assert_eq!(creds.isilon_clusters[0].port(), 443);
        Ok(())
    }

    #[test]
    fn obfuscated_cluster_points_at_sidecar() -> anyhow::Result<()> {
        let (creds, _) = secret::decode_payload::<IsilonCreds>("creds", CREDS.as_bytes())?;
        let cluster = &creds.isilon_clusters[0];
        let local = ConnectionRecord {
            endpoint: secret::local_endpoint(9400),
            ..Default::default()
        };
        let obfuscated = cluster.obfuscated(&local)?;

        assert_eq!(obfuscated.endpoint, "localhost");
        assert_eq!(obfuscated.endpoint_port, Some(Port(9400)));
        assert_eq!(obfuscated.mount_endpoint.as_deref(), Some("10.0.0.1"));
        assert_eq!(obfuscated.username, SCRUBBED);
        assert_eq!(obfuscated.password, SCRUBBED);
        assert_eq!(obfuscated.rest["isiPath"], "/ifs/data/csi");

        // Already obfuscated clusters are kept as they are.
        assert_eq!(obfuscated.obfuscated(&local)?, obfuscated);
        assert_eq!(obfuscated.record().endpoint, "https://localhost:9400");
        Ok(())
    }

    #[test]
    fn rewritten_secret_keeps_its_format() -> anyhow::Result<()> {
        let (creds, format) = secret::decode_payload::<IsilonCreds>("creds", CREDS.as_bytes())?;
        let secret = rewrite_credentials(&Secret::default(), &creds, format)?;
        let data = secret::require_secret_data(&secret, AUTH_CONFIG_KEY)?;

        assert!(serde_json::from_slice::<serde_json::Value>(data).is_err());
        let (decoded, _) = secret::decode_payload::<IsilonCreds>("creds", data)?;
        assert_eq!(decoded, creds);
        Ok(())
    }
}
