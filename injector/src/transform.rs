mod multi_array;
mod powermax;
mod powerscale;
mod sidecar;

pub use self::multi_array::MultiArray;
pub use self::powermax::PowerMax;
pub use self::powerscale::PowerScale;
pub use self::sidecar::{ProxySidecar, Workload, plugin_identifier};

use indexmap::IndexMap;
use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment},
    core::v1::Secret,
};

use crate::{
    detect::InjectResources,
    error::InjectError,
    generator::SecretGenerator,
    index::Indexes,
    manifest::{
        Str,
        name::{AUTH_CONFIG_KEY, AUTH_CONFIG_SECRET, ROOT_CERTIFICATE_KEY, ROOT_CERTIFICATE_SECRET},
    },
    options::InjectOptions,
    resource::Resource,
    reslist::List,
    secret::ConnectionRecord,
};

/// Produces the objects to add or replace for one driver family. The input is never modified,
/// the returned list holds only new or changed objects.
pub trait Transformer {
    fn transform(&self, cx: &Context<'_>) -> anyhow::Result<List>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    MultiArray(MultiArray),
    PowerMax(PowerMax),
    PowerScale(PowerScale),
}

impl Transformer for Strategy {
    fn transform(&self, cx: &Context<'_>) -> anyhow::Result<List> {
        match self {
            Strategy::MultiArray(t) => t.transform(cx),
            Strategy::PowerMax(t) => t.transform(cx),
            Strategy::PowerScale(t) => t.transform(cx),
        }
    }
}

/// Read-only state shared by every step of a run.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub indexes: &'a Indexes,
    pub resources: &'a InjectResources,
    /// Namespace of the detected driver.
    pub namespace: &'a str,
    pub options: &'a InjectOptions,
    pub root_certificate: &'a [u8],
    /// First local port of the detected family.
    pub start_port: u16,
}

impl<'a> Context<'a> {
    pub fn sidecar(&self, config_params_volume: &'a str) -> ProxySidecar<'a> {
        ProxySidecar {
            image: &self.options.image_addr,
            proxy_host: &self.options.proxy_host,
            insecure: self.options.insecure,
            config_params_volume,
        }
    }

    /// The root CA Secret, emitted on every run so that a new certificate replaces the old one.
    pub fn root_certificate_secret(&self) -> anyhow::Result<Resource> {
        SecretGenerator::new(ROOT_CERTIFICATE_SECRET)
            .namespace(self.namespace)
            .data(ROOT_CERTIFICATE_KEY, self.root_certificate)?
            .generate()
    }

    /// The authorization config Secret holding `records`, next to the credential Secret it was
    /// derived from.
    pub fn authorization_secret(
        &self,
        source: &Secret,
        records: &[ConnectionRecord],
    ) -> anyhow::Result<Resource> {
        let namespace = source.metadata.namespace.as_deref().unwrap_or(self.namespace);
        SecretGenerator::new(AUTH_CONFIG_SECRET)
            .namespace(namespace)
            .data(AUTH_CONFIG_KEY, serde_json::to_vec(records)?)?
            .generate()
    }

    /// The credential Secret of the detected driver, or `None` when the run has none to target.
    pub fn credential_secret(&self) -> anyhow::Result<Option<(&'a Str, &'a Secret)>> {
        lookup(self.resources.secret.as_ref(), &self.indexes.secrets)
    }

    pub fn deployment(&self) -> anyhow::Result<Option<&'a Deployment>> {
        Ok(lookup(self.resources.deployment.as_ref(), &self.indexes.deployments)?
            .map(|(_, d)| d))
    }

    pub fn daemon_set(&self) -> anyhow::Result<Option<&'a DaemonSet>> {
        Ok(lookup(self.resources.daemon_set.as_ref(), &self.indexes.daemon_sets)?
            .map(|(_, d)| d))
    }

    pub fn reverse_proxy(&self) -> anyhow::Result<Option<&'a Deployment>> {
        Ok(lookup(self.resources.reverse_proxy.as_ref(), &self.indexes.deployments)?
            .map(|(_, d)| d))
    }
}

fn lookup<'a, K: k8s_openapi::Resource>(
    name: Option<&Str>,
    index: &'a IndexMap<Str, K>,
) -> anyhow::Result<Option<(&'a Str, &'a K)>> {
    let Some(name) = name else {
        return Ok(None);
    };
    index
        .get_key_value(name)
        .map(Some)
        .ok_or_else(|| InjectError::not_found(K::KIND, name.clone()).into())
}
