use std::sync::LazyLock;

use k8s_openapi::api::{apps::v1::Deployment, core::v1::ConfigMap};
use regex::{NoExpand, Regex};

use super::{
    Context, Transformer, Workload,
    sidecar::{container_mut, env_value, set_env},
};
use crate::{
    error::InjectError,
    manifest::name::DRIVER_CONTAINER,
    resource::Resource,
    reslist::List,
    secret::{self, ConnectionRecord},
};

const CONFIG_PARAMS_VOLUME: &str = "powermax-config-params";
const REVERSE_PROXY_CONFIG_KEY: &str = "config.yaml";

const ENDPOINT_ENV: &str = "X_CSI_POWERMAX_ENDPOINT";
const INTENDED_ENDPOINT_ENV: &str = "CSM_CSI_POWERMAX_ENDPOINT";
const MANAGED_ARRAYS_ENV: &str = "X_CSI_MANAGED_ARRAYS";

static ENDPOINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https://[^\s"']+"#).expect("valid endpoint pattern"));

/// A single Unisphere endpoint, reached either directly by the driver or through the
/// CSI reverse proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerMax;

/// Where the driver currently finds Unisphere.
enum Upstream<'a> {
    ReverseProxy { config_map: &'a ConfigMap, endpoint: &'a str },
    Direct { endpoint: &'a str },
}

impl Upstream<'_> {
    fn endpoint(&self) -> &str {
        match self {
            Upstream::ReverseProxy { endpoint, .. } | Upstream::Direct { endpoint } => endpoint,
        }
    }
}

impl Transformer for PowerMax {
    #[tracing::instrument(skip_all, name = "powermax", fields(namespace = cx.namespace))]
    fn transform(&self, cx: &Context<'_>) -> anyhow::Result<List> {
        let mut modified = List::default();
        modified.push(cx.root_certificate_secret()?);

        let controller = cx.deployment()?;
        let upstream = upstream(cx, controller)?;

        // The one record the sidecar serves, with its local and intended endpoints.
        let mut record = None;
        if let Some((name, source)) = cx.credential_secret()? {
            let what = format!("secret `{name}`");
            let username = secret::require_secret_data(source, "username")?;
            let password = secret::require_secret_data(source, "password")?;
            let endpoint = upstream.as_ref().map(Upstream::endpoint).ok_or_else(|| {
                InjectError::structural(what.as_str(), "no Unisphere endpoint to proxy")
            })?;

            let raw = ConnectionRecord {
                username: utf8(&what, username)?,
                password: utf8(&what, password)?,
                endpoint: endpoint.to_string(),
                system_id: controller
                    .and_then(|c| driver_env(c, MANAGED_ARRAYS_ENV))
                    .and_then(|arrays| arrays.split(',').map(str::trim).find(|a| !a.is_empty()))
                    .unwrap_or_default()
                    .to_string(),
                insecure: cx.options.insecure,
                is_default: true,
                ..Default::default()
            };

            let previous = secret::previous_records(cx.indexes)?;
            let obfuscated = secret::obfuscate(&[raw], cx.start_port, &previous)?;
            modified.push(cx.authorization_secret(source, &obfuscated)?);
            record = obfuscated.into_iter().next();
        }

        let direct = matches!(upstream, Some(Upstream::Direct { .. }));
        let sidecar = cx.sidecar(CONFIG_PARAMS_VOLUME);

        if let Some(controller) = controller {
            let mut controller = sidecar.inject(controller, true)?;
            let driver = controller
                .pod_spec_mut()
                .and_then(|pod| container_mut(pod, DRIVER_CONTAINER));
            if let (Some(driver), Some(record)) = (driver, &record) {
                if direct {
                    set_env(driver, ENDPOINT_ENV, &record.endpoint);
                }
                set_env(driver, INTENDED_ENDPOINT_ENV, &record.intended_endpoint);
            }
            modified.push(Resource::from_object(&controller)?);
        }

        if let Some(node) = cx.daemon_set()? {
            let mut node = sidecar.inject(node, false)?;
            let driver = node
                .pod_spec_mut()
                .and_then(|pod| container_mut(pod, DRIVER_CONTAINER));
            if let (true, Some(driver), Some(record)) = (direct, driver, &record) {
                set_env(driver, ENDPOINT_ENV, &record.endpoint);
            }
            modified.push(Resource::from_object(&node)?);
        }

        if let (Some(Upstream::ReverseProxy { config_map, .. }), Some(record)) =
            (&upstream, &record)
        {
            let config_map = rewrite_config_map(config_map, &record.endpoint);
            modified.push(Resource::from_object(&config_map)?);

            if let Some(reverse_proxy) = cx.reverse_proxy()? {
                let reverse_proxy = sidecar.inject(reverse_proxy, false)?;
                modified.push(Resource::from_object(&reverse_proxy)?);
            }
        }

        Ok(modified)
    }
}

/// The reverse proxy is in play when its ConfigMap is part of the input. Otherwise the
/// controller's driver container names the endpoint.
fn upstream<'a>(
    cx: &Context<'a>,
    controller: Option<&'a Deployment>,
) -> anyhow::Result<Option<Upstream<'a>>> {
    let config_map = cx
        .resources
        .config_map
        .as_ref()
        .and_then(|name| cx.indexes.config_maps.get(name));

    if let Some(config_map) = config_map {
        let name = config_map.metadata.name.as_deref().unwrap_or_default();
        let endpoint = config_map
            .data
            .as_ref()
            .and_then(|data| data.get(REVERSE_PROXY_CONFIG_KEY))
            .and_then(|config| ENDPOINT.find(config))
            .ok_or_else(|| {
                InjectError::structural(
                    format!("ConfigMap `{name}`"),
                    format!("no https endpoint in `{REVERSE_PROXY_CONFIG_KEY}`"),
                )
            })?
            .as_str();
        tracing::debug!(endpoint, "using reverse proxy endpoint");
        return Ok(Some(Upstream::ReverseProxy { config_map, endpoint }));
    }

    let Some(controller) = controller else {
        return Ok(None);
    };
    let endpoint = driver_env(controller, ENDPOINT_ENV).ok_or_else(|| {
        let name = controller.metadata.name.as_deref().unwrap_or_default();
        InjectError::structural(
            format!("Deployment `{name}`"),
            format!("container `{DRIVER_CONTAINER}` has no `{ENDPOINT_ENV}` variable"),
        )
    })?;
    Ok(Some(Upstream::Direct { endpoint }))
}

fn driver_env<'a>(deployment: &'a Deployment, name: &str) -> Option<&'a str> {
    deployment
        .pod_spec()?
        .containers
        .iter()
        .find(|c| c.name == DRIVER_CONTAINER)
        .and_then(|driver| env_value(driver, name))
}

fn rewrite_config_map(config_map: &ConfigMap, local_endpoint: &str) -> ConfigMap {
    let mut config_map = config_map.clone();
    if let Some(config) = config_map
        .data
        .as_mut()
        .and_then(|data| data.get_mut(REVERSE_PROXY_CONFIG_KEY))
    {
        *config = ENDPOINT.replace(config, NoExpand(local_endpoint)).into_owned();
    }
    config_map
}

fn utf8(what: &str, bytes: &[u8]) -> anyhow::Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|err| InjectError::decode(what, err).into())
}
