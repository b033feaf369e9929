use anyhow::Context;
use indexmap::IndexMap;
use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment},
    core::v1::{ConfigMap, Secret},
};
use serde::de::DeserializeOwned;

use crate::{manifest::Str, reslist::List};

/// Name-keyed view of every object of kind `K` in `list`. Only items whose header matches `K`
/// are decoded. Duplicate names resolve to the last one in the list.
#[tracing::instrument(skip_all, level = "debug", fields(kind = K::KIND))]
pub fn index<K>(list: &List) -> anyhow::Result<IndexMap<Str, K>>
where
    K: k8s_openapi::Resource + DeserializeOwned,
{
    let mut map = IndexMap::new();
    for resource in list.iter().filter(|resource| resource.gvk().is::<K>()) {
        let object = resource
            .to_object::<K>()
            .with_context(|| format!("indexing {}", K::KIND))?;
        map.insert(resource.name().clone(), object);
    }
    Ok(map)
}

/// The kinds the injector reads, indexed once per run.
#[derive(Debug, Default)]
pub struct Indexes {
    pub secrets: IndexMap<Str, Secret>,
    pub deployments: IndexMap<Str, Deployment>,
    pub daemon_sets: IndexMap<Str, DaemonSet>,
    pub config_maps: IndexMap<Str, ConfigMap>,
}

impl Indexes {
    pub fn build(list: &List) -> anyhow::Result<Self> {
        Ok(Self {
            secrets: index(list)?,
            deployments: index(list)?,
            daemon_sets: index(list)?,
            config_maps: index(list)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r#"
apiVersion: v1
kind: List
items:
  - apiVersion: v1
    kind: Secret
    metadata:
      name: vxflexos-config
      namespace: vxflexos
    data:
      config: W10=
  - apiVersion: v1
    kind: Secret
    metadata:
      name: other
      namespace: vxflexos
  - apiVersion: apps/v1
    kind: Deployment
    metadata:
      name: vxflexos-controller
      namespace: vxflexos
    spec:
      selector: {}
      template:
        spec:
          containers: []
  - apiVersion: v1
    kind: Secret
    metadata:
      name: vxflexos-config
      namespace: vxflexos
      labels:
        generation: second
"#;

    #[test]
    fn indexes_by_kind_and_name() -> anyhow::Result<()> {
        let list = List::from_slice(LIST.as_bytes())?;
        let indexes = Indexes::build(&list)?;
        assert_eq!(indexes.secrets.len(), 2);
        assert_eq!(indexes.deployments.len(), 1);
        assert!(indexes.daemon_sets.is_empty());
        assert!(indexes.config_maps.is_empty());
        Ok(())
    }

    #[test]
    fn last_duplicate_wins() -> anyhow::Result<()> {
        let list = List::from_slice(LIST.as_bytes())?;
        let secrets = index::<Secret>(&list)?;
        let labels = secrets["vxflexos-config"].metadata.labels.clone().unwrap_or_default();
        assert_eq!(labels.get("generation").map(String::as_str), Some("second"));
        Ok(())
    }

    #[test]
    fn malformed_item_fails() -> anyhow::Result<()> {
        let list = List::from_slice(
            br#"
apiVersion: v1
kind: List
items:
  - apiVersion: apps/v1
    kind: Deployment
    metadata:
      name: broken
    spec:
      replicas: many
"#,
        )?;
        assert!(index::<Deployment>(&list).is_err());
        Ok(())
    }
}
