//! Wires the authorization sidecar proxy into the Kubernetes resources of an installed CSI
//! driver.
//!
//! The input is a `kind: List` of the driver's Secrets, Deployments, DaemonSets and ConfigMaps
//! (as printed by `kubectl get ... -o yaml`). The output is a `kind: List` of only the objects
//! that must be created or replaced to route the driver through the sidecar. Nothing talks to a
//! cluster, every run is a single pass over the document.

pub mod detect;
pub mod error;
pub mod generator;
pub mod index;
pub mod manifest;
pub mod options;
pub mod ports;
pub mod reslist;
pub mod resource;
pub mod secret;
pub mod serde_ex;
pub mod transform;
pub mod yaml;

use anyhow::Context as _;

use self::{
    detect::detect,
    index::Indexes,
    options::{CertificateSource, FsCertificates, InjectOptions},
    reslist::List,
    transform::{Context, Transformer},
};

pub use self::error::InjectError;

pub struct Injector<C = FsCertificates> {
    options: InjectOptions,
    certificates: C,
}

impl Injector {
    pub fn new(options: InjectOptions) -> Self {
        Self::with_certificates(options, FsCertificates)
    }
}

impl<C: CertificateSource> Injector<C> {
    pub fn with_certificates(options: InjectOptions, certificates: C) -> Self {
        Self {
            options,
            certificates,
        }
    }

    /// Runs every document of a YAML stream independently. The first failing document fails the
    /// whole stream.
    pub fn inject(&self, input: &[u8]) -> anyhow::Result<Vec<List>> {
        yaml::documents(input)?
            .into_iter()
            .enumerate()
            .map(|(i, document)| {
                List::from_value(document)
                    .and_then(|list| self.inject_list(&list))
                    .with_context(|| format!("injecting document {i}"))
            })
            .collect()
    }

    #[tracing::instrument(skip_all, fields(items = existing.len()))]
    pub fn inject_list(&self, existing: &List) -> anyhow::Result<List> {
        let root_certificate = match &self.options.root_certificate {
            Some(path) => self.certificates.load(path)?,
            None => vec![],
        };

        let indexes = Indexes::build(existing)?;
        let detection = detect(&indexes)?;
        let start_port = self.options.port_ranges.start(detection.family);
        tracing::debug!(start_port, "starting port");

        let cx = Context {
            indexes: &indexes,
            resources: &detection.resources,
            namespace: &detection.namespace,
            options: &self.options,
            root_certificate: &root_certificate,
            start_port,
        };
        detection.strategy.transform(&cx)
    }
}
