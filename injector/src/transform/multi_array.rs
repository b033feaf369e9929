use k8s_openapi::api::core::v1::PodSpec;

use super::{Context, Transformer, Workload};
use crate::{
    manifest::name::{AUTH_CONFIG_KEY, AUTH_CONFIG_SECRET},
    resource::Resource,
    reslist::List,
    secret::{self, ConnectionRecord},
};

const DRIVER_CONFIG_VOLUME: &str = "vxflexos-config";
const CONFIG_PARAMS_VOLUME: &str = "vxflexos-config-params";

/// Drivers whose credential Secret is already a list of connection records, one per array. The
/// driver reads the authorization config Secret directly, so its config volume is re-pointed
/// there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiArray;

impl Transformer for MultiArray {
    #[tracing::instrument(skip_all, name = "multi_array", fields(namespace = cx.namespace))]
    fn transform(&self, cx: &Context<'_>) -> anyhow::Result<List> {
        let mut modified = List::default();
        modified.push(cx.root_certificate_secret()?);

        if let Some((name, source)) = cx.credential_secret()? {
            let data = secret::require_secret_data(source, AUTH_CONFIG_KEY)?;
            let (records, format) = secret::decode_payload::<Vec<ConnectionRecord>>(
                &format!("secret `{name}`"),
                data,
            )?;
            tracing::debug!(?format, records = records.len(), "decoded credentials");

            let previous = secret::previous_records(cx.indexes)?;
            let obfuscated = secret::obfuscate(&records, cx.start_port, &previous)?;
            modified.push(cx.authorization_secret(source, &obfuscated)?);
        }

        let sidecar = cx.sidecar(CONFIG_PARAMS_VOLUME);
        if let Some(deployment) = cx.deployment()? {
            let mut deployment = sidecar.inject(deployment, true)?;
            repoint_driver_config(deployment.pod_spec_mut());
            modified.push(Resource::from_object(&deployment)?);
        }
        if let Some(daemon_set) = cx.daemon_set()? {
            let mut daemon_set = sidecar.inject(daemon_set, false)?;
            repoint_driver_config(daemon_set.pod_spec_mut());
            modified.push(Resource::from_object(&daemon_set)?);
        }

        Ok(modified)
    }
}

fn repoint_driver_config(pod: Option<&mut PodSpec>) {
    let volumes = pod.and_then(|pod| pod.volumes.as_mut());
    for volume in volumes.into_iter().flatten() {
        if volume.name != DRIVER_CONFIG_VOLUME {
            continue;
        }
        if let Some(source) = volume.secret.as_mut() {
            source.secret_name = Some(AUTH_CONFIG_SECRET.to_string());
        }
    }
}
