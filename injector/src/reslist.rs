use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{
    error::InjectError,
    manifest::{Symbol, TypeMeta, apiversion, kind},
    resource::Resource,
    yaml,
};

/// A `kind: List` document, the only input shape the injector accepts and the shape of
/// everything it emits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    api_version: apiversion::V1,
    kind: kind::List,
    #[serde(default)]
    items: Vec<Resource>,
}

impl Default for List {
    fn default() -> Self {
        Self::new([])
    }
}

impl List {
    pub fn new(resources: impl IntoIterator<Item = Resource>) -> Self {
        Self {
            api_version: apiversion::V1,
            kind: kind::List,
            items: resources.into_iter().collect(),
        }
    }

    pub fn from_value(value: serde_json::Value) -> anyhow::Result<Self> {
        let meta = TypeMeta::deserialize(&value)
            .map_err(|err| InjectError::decode("resource list header", err))?;
        if meta.kind != kind::List::VALUE {
            return Err(InjectError::decode(
                "resource list",
                format!(
                    "only `kind: List` input is supported (found `{}`), \
                     try `kubectl get deploy,ds,secrets,cm -n <namespace> -o yaml`",
                    meta.kind
                ),
            )
            .into());
        }

        serde_json::from_value(value)
            .map_err(|err| InjectError::decode("resource list", err).into())
    }

    pub fn from_slice(s: &[u8]) -> anyhow::Result<Self> {
        let value = yaml::from_slice::<serde_json::Value>(s)
            .map_err(|err| InjectError::decode("resource list", err))?;
        Self::from_value(value)
    }

    pub fn items(&self) -> &[Resource] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Resource> + DoubleEndedIterator {
        self.items.iter()
    }

    pub fn push(&mut self, resource: Resource) {
        self.items.push(resource);
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        yaml::to_string(self).context("encoding resource list as YAML")
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("encoding resource list as JSON")
    }
}

impl IntoIterator for List {
    type Item = Resource;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl FromIterator<Resource> for List {
    fn from_iter<T: IntoIterator<Item = Resource>>(iter: T) -> Self {
        Self::new(iter)
    }
}
