use std::collections::BTreeMap;

use anyhow::bail;
use k8s_openapi::{
    ByteString, api::core::v1::Secret, apimachinery::pkg::apis::meta::v1::ObjectMeta,
};

use crate::{manifest::Str, resource::Resource};

/// Builds the Opaque Secrets the injector adds to a list.
#[derive(Debug, Clone)]
pub struct SecretGenerator {
    name: Str,
    namespace: Option<Str>,
    data: BTreeMap<String, ByteString>,
}

impl SecretGenerator {
    pub fn new(name: impl Into<Str>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            data: BTreeMap::new(),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<Str>) -> Self {
        let namespace = namespace.into();
        self.namespace = (!namespace.is_empty()).then_some(namespace);
        self
    }

    pub fn data(mut self, key: &str, value: impl Into<Vec<u8>>) -> anyhow::Result<Self> {
        if self
            .data
            .insert(key.to_string(), ByteString(value.into()))
            .is_some()
        {
            bail!("duplicate key `{key}` in Secret `{}`", self.name);
        }
        Ok(self)
    }

    pub fn secret(&self) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(self.name.to_string()),
                namespace: self.namespace.as_ref().map(ToString::to_string),
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(self.data.clone()),
            ..Default::default()
        }
    }

    #[tracing::instrument(skip_all, name = "generate_secret", fields(name = %self.name))]
    pub fn generate(self) -> anyhow::Result<Resource> {
        tracing::debug!(keys = self.data.len(), "generated secret");
        Resource::from_object(&self.secret())
    }
}
