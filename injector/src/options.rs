use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::Context;

use crate::ports::PortRanges;

/// Everything a run needs besides the input list.
#[derive(Debug, Clone, Default)]
pub struct InjectOptions {
    /// Image of the sidecar proxy container.
    pub image_addr: String,
    /// Address of the authorization server the sidecar forwards to.
    pub proxy_host: String,
    /// Skip TLS verification between the sidecar and the authorization server.
    pub insecure: bool,
    /// PEM file with the authorization server's root CA. Without one, the root certificate
    /// Secret is emitted empty.
    pub root_certificate: Option<PathBuf>,
    pub port_ranges: PortRanges,
}

/// Reads the root certificate file.
pub trait CertificateSource {
    fn load(&self, path: &Path) -> anyhow::Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsCertificates;

impl CertificateSource for FsCertificates {
    fn load(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        std::fs::read(path)
            .with_context(|| format!("reading root certificate {}", path.display()))
    }
}

/// Certificates keyed by path, for runs that must not touch the filesystem.
#[derive(Debug, Clone, Default)]
pub struct MemoryCertificates {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryCertificates {
    pub fn with(mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }
}

impl CertificateSource for MemoryCertificates {
    fn load(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .with_context(|| format!("reading root certificate {}: no such file", path.display()))
    }
}

impl<C: CertificateSource + ?Sized> CertificateSource for &C {
    fn load(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        (**self).load(path)
    }
}
