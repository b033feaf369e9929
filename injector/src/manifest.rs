use core::fmt;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

pub type Str = CompactString;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    #[serde(default)]
    pub api_version: Str,
    #[serde(default)]
    pub kind: Str,
}

pub mod kind {
    use super::define_symbol;

    define_symbol!(List = "List");
}

pub mod apiversion {
    use super::define_symbol;

    define_symbol!(V1 = "v1");
}

/// Names of the objects, containers and fields the sidecar wiring relies on. These are shared with
/// the sidecar image and the authorization server so they must not drift.
pub mod name {
    pub const PROXY_CONTAINER: &str = "karavi-authorization-proxy";
    pub const INJECTED_ANNOTATION: &str = "com.dell.karavi-authorization-proxy";

    pub const AUTH_CONFIG_SECRET: &str = "karavi-authorization-config";
    pub const AUTH_CONFIG_VOLUME: &str = "karavi-authorization-config";
    pub const AUTH_CONFIG_KEY: &str = "config";
    pub const AUTH_CONFIG_MOUNT_PATH: &str = "/etc/karavi-authorization/config";

    pub const ROOT_CERTIFICATE_SECRET: &str = "proxy-server-root-certificate";
    pub const ROOT_CERTIFICATE_VOLUME: &str = "proxy-server-root-certificate";
    pub const ROOT_CERTIFICATE_KEY: &str = "rootCertificate.pem";
    pub const ROOT_CERTIFICATE_MOUNT_PATH: &str = "/etc/karavi-authorization/root-certificates";

    pub const DRIVER_CONFIG_PARAMS_MOUNT_PATH: &str = "/etc/karavi-authorization";

    pub const TOKEN_SECRET: &str = "proxy-authz-tokens";

    pub const DRIVER_CONTAINER: &str = "driver";
    pub const PROVISIONER_CONTAINER: &str = "provisioner";
    pub const EXTRA_CREATE_METADATA_FLAG: &str = "--extra-create-metadata";

    /// Stands in for scrubbed usernames and passwords.
    pub const SCRUBBED: &str = "-";
}

macro_rules! define_symbol {
    ($name:ident = $value:literal) => {
        #[derive(Clone, PartialEq, Eq, Hash, Default)]
        #[allow(non_camel_case_types)]
        pub struct $name;

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", $value)
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", $value)
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str($value)
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value: $crate::manifest::Str = ::serde::Deserialize::deserialize(deserializer)?;
                if value == $value {
                    Ok($name)
                } else {
                    Err(serde::de::Error::custom(format!(
                        "expected `{}`, found `{value}`",
                        $value
                    )))
                }
            }
        }

        impl $crate::manifest::Symbol for $name {
            const VALUE: &'static str = $value;
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                other == $value
            }
        }
    };
}

use define_symbol;

pub trait Symbol: fmt::Debug + Send + Sync {
    const VALUE: &'static str;
}
