use std::fmt;

use anyhow::Context;
use compact_str::format_compact;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::manifest::Str;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gvk {
    pub group: Str,
    pub version: Str,
    pub kind: Str,
}

impl Gvk {
    fn parse(api_version: &str, kind: Str) -> Self {
        let (group, version) = api_version
            .split_once('/')
            .map_or(("".into(), api_version.into()), |(g, v)| (g.into(), v.into()));
        Gvk {
            group,
            version,
            kind,
        }
    }

    pub fn api_version(&self) -> Str {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format_compact!("{}/{}", self.group, self.version)
        }
    }

    /// Whether this is the kind `K` as served by the API version `K` is generated for.
    pub fn is<K: k8s_openapi::Resource>(&self) -> bool {
        self.kind == K::KIND && self.group == K::GROUP && self.version == K::VERSION
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}.{}", self.kind, self.version)
        } else {
            write!(f, "{}.{}.{}", self.kind, self.version, self.group)
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ResId {
    pub gvk: Gvk,
    pub name: Str,
    pub namespace: Option<Str>,
}

impl fmt::Debug for ResId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for ResId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(namespace) = &self.namespace {
            write!(f, "{}/{}.{namespace}", self.gvk, self.name)
        } else {
            write!(f, "{}/{}", self.gvk, self.name)
        }
    }
}

/// One item of a resource list, kept opaque so that anything the injector does not touch
/// re-encodes exactly as it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    id: ResId,
    /// Everything except `apiVersion` and `kind`, which live in `id`.
    root: AnyObject,
}

pub type AnyObject = serde_json::Map<String, serde_json::Value>;

impl Resource {
    /// Encodes a typed object (e.g. a `Deployment`) as an opaque resource.
    pub fn from_object<K: Serialize>(object: &K) -> anyhow::Result<Self> {
        let value = serde_json::to_value(object)?;
        serde_json::from_value(value).map_err(Into::into)
    }

    /// Decodes the full typed representation of this resource.
    pub fn to_object<K: DeserializeOwned>(&self) -> anyhow::Result<K> {
        let value = serde_json::to_value(self)?;
        serde_json::from_value(value).with_context(|| format!("decoding resource `{}`", self.id))
    }

    pub fn id(&self) -> &ResId {
        &self.id
    }

    pub fn name(&self) -> &Str {
        &self.id.name
    }

    pub fn namespace(&self) -> Option<&Str> {
        self.id.namespace.as_ref()
    }

    pub fn gvk(&self) -> &Gvk {
        &self.id.gvk
    }

    pub fn kind(&self) -> &Str {
        &self.id.gvk.kind
    }
}

impl Serialize for Resource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.root.len() + 2))?;
        map.serialize_entry("apiVersion", &self.id.gvk.api_version())?;
        map.serialize_entry("kind", &self.id.gvk.kind)?;
        for (key, value) in &self.root {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        // Only the identifying header is typed, the rest of the document is carried as is.
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Res {
            api_version: Str,
            kind: Str,
            #[serde(flatten)]
            root: AnyObject,
        }

        #[derive(Deserialize)]
        struct Meta {
            name: Str,
            #[serde(default)]
            namespace: Option<Str>,
        }

        let res = Res::deserialize(deserializer)
            .map_err(|err| serde::de::Error::custom(format!("parsing resource: {err}")))?;

        let metadata = res
            .root
            .get("metadata")
            .cloned()
            .ok_or_else(|| serde::de::Error::custom("parsing resource: missing `metadata`"))?;
        let meta = Meta::deserialize(metadata).map_err(|err| {
            serde::de::Error::custom(format!("parsing resource metadata: {err}"))
        })?;

        Ok(Resource {
            id: ResId {
                gvk: Gvk::parse(&res.api_version, res.kind),
                name: meta.name,
                namespace: meta.namespace,
            },
            root: res.root,
        })
    }
}
