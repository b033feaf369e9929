use k8s_openapi::{
    Metadata,
    api::{
        apps::v1::{DaemonSet, Deployment},
        core::v1::{
            Container, EnvVar, EnvVarSource, PodSpec, SecretKeySelector, SecretVolumeSource,
            Volume, VolumeMount,
        },
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::InjectError,
    manifest::name::{
        AUTH_CONFIG_MOUNT_PATH, AUTH_CONFIG_SECRET, AUTH_CONFIG_VOLUME,
        DRIVER_CONFIG_PARAMS_MOUNT_PATH, EXTRA_CREATE_METADATA_FLAG, INJECTED_ANNOTATION,
        PROVISIONER_CONTAINER, PROXY_CONTAINER, ROOT_CERTIFICATE_MOUNT_PATH,
        ROOT_CERTIFICATE_SECRET, ROOT_CERTIFICATE_VOLUME, TOKEN_SECRET,
    },
};

/// A pod-owning kind the sidecar can be wired into.
pub trait Workload:
    k8s_openapi::Resource + Metadata<Ty = ObjectMeta> + Clone + Serialize + DeserializeOwned
{
    fn pod_spec(&self) -> Option<&PodSpec>;

    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec>;
}

impl Workload for Deployment {
    fn pod_spec(&self) -> Option<&PodSpec> {
        self.spec.as_ref()?.template.spec.as_ref()
    }

    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        self.spec.as_mut()?.template.spec.as_mut()
    }
}

impl Workload for DaemonSet {
    fn pod_spec(&self) -> Option<&PodSpec> {
        self.spec.as_ref()?.template.spec.as_ref()
    }

    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        self.spec.as_mut()?.template.spec.as_mut()
    }
}

/// Containers named `karavi-metrics-<family>` identify the plugin as `<family>` instead of the
/// namespace.
const METRICS_CONTAINER_PREFIX: &str = "karavi-metrics-";
const METRICS_FAMILIES: [&str; 3] = ["powerflex", "powermax", "powerscale"];

/// The identifier the sidecar reports to the authorization server.
pub fn plugin_identifier<'a>(namespace: &'a str, containers: &'a [Container]) -> &'a str {
    containers
        .iter()
        .filter_map(|c| c.name.strip_prefix(METRICS_CONTAINER_PREFIX))
        .find(|family| METRICS_FAMILIES.iter().any(|known| known == family))
        .unwrap_or(namespace)
}

#[derive(Debug, Clone, Copy)]
pub struct ProxySidecar<'a> {
    pub image: &'a str,
    pub proxy_host: &'a str,
    pub insecure: bool,
    /// The driver's own `<release>-config-params` volume, mounted into the sidecar when the pod
    /// has it.
    pub config_params_volume: &'a str,
}

impl ProxySidecar<'_> {
    pub fn container(&self, plugin_identifier: &str, mount_config_params: bool) -> Container {
        let mut volume_mounts = vec![
            VolumeMount {
                name: AUTH_CONFIG_VOLUME.to_string(),
                mount_path: AUTH_CONFIG_MOUNT_PATH.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: ROOT_CERTIFICATE_VOLUME.to_string(),
                mount_path: ROOT_CERTIFICATE_MOUNT_PATH.to_string(),
                ..Default::default()
            },
        ];
        if mount_config_params {
            volume_mounts.push(VolumeMount {
                name: self.config_params_volume.to_string(),
                mount_path: DRIVER_CONFIG_PARAMS_MOUNT_PATH.to_string(),
                ..Default::default()
            });
        }

        Container {
            name: PROXY_CONTAINER.to_string(),
            image: Some(self.image.to_string()),
            image_pull_policy: Some("Always".to_string()),
            env: Some(vec![
                env("PROXY_HOST", self.proxy_host),
                env("INSECURE", if self.insecure { "true" } else { "false" }),
                env("PLUGIN_IDENTIFIER", plugin_identifier),
                token_env("ACCESS_TOKEN", "access"),
                token_env("REFRESH_TOKEN", "refresh"),
            ]),
            volume_mounts: Some(volume_mounts),
            ..Default::default()
        }
    }

    /// Returns a copy of `workload` with exactly one freshly built proxy container and the
    /// volumes it mounts. When `provisioner` is set the `provisioner` container also gets the
    /// extra-metadata flag.
    #[tracing::instrument(skip_all, fields(kind = W::KIND, name = workload.metadata().name.as_deref()))]
    pub fn inject<W: Workload>(&self, workload: &W, provisioner: bool) -> anyhow::Result<W> {
        let mut workload = workload.clone();
        let namespace = workload.metadata().namespace.clone().unwrap_or_default();
        let name = workload.metadata().name.clone().unwrap_or_default();

        let pod = workload.pod_spec_mut().ok_or_else(|| {
            InjectError::structural(format!("{} `{name}`", W::KIND), "has no pod template spec")
        })?;

        ensure_secret_volume(pod, AUTH_CONFIG_VOLUME, AUTH_CONFIG_SECRET);
        ensure_secret_volume(pod, ROOT_CERTIFICATE_VOLUME, ROOT_CERTIFICATE_SECRET);

        pod.containers.retain(|c| c.name != PROXY_CONTAINER);
        let plugin_id = plugin_identifier(&namespace, &pod.containers).to_string();
        let mount_config_params = has_volume(pod, self.config_params_volume);
        pod.containers
            .push(self.container(&plugin_id, mount_config_params));

        if provisioner {
            add_provisioner_flag(pod);
        }

        workload
            .metadata_mut()
            .annotations
            .get_or_insert_with(Default::default)
            .insert(INJECTED_ANNOTATION.to_string(), "true".to_string());

        tracing::debug!(%plugin_id, mount_config_params, "injected proxy sidecar");
        Ok(workload)
    }
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn token_env(name: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: TOKEN_SECRET.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn has_volume(pod: &PodSpec, name: &str) -> bool {
    pod.volumes
        .iter()
        .flatten()
        .any(|volume| volume.name == name)
}

fn ensure_secret_volume(pod: &mut PodSpec, name: &str, secret_name: &str) {
    if has_volume(pod, name) {
        return;
    }
    pod.volumes.get_or_insert_with(Vec::new).push(Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    });
}

fn add_provisioner_flag(pod: &mut PodSpec) {
    for container in pod
        .containers
        .iter_mut()
        .filter(|c| c.name == PROVISIONER_CONTAINER)
    {
        let args = container.args.get_or_insert_with(Vec::new);
        if !args.iter().any(|arg| arg == EXTRA_CREATE_METADATA_FLAG) {
            args.push(EXTRA_CREATE_METADATA_FLAG.to_string());
        }
    }
}

/// Sets `name` on the container, replacing an existing value.
pub fn set_env(container: &mut Container, name: &str, value: &str) {
    let vars = container.env.get_or_insert_with(Vec::new);
    match vars.iter_mut().find(|var| var.name == name) {
        Some(var) => *var = env(name, value),
        None => vars.push(env(name, value)),
    }
}

pub fn env_value<'a>(container: &'a Container, name: &str) -> Option<&'a str> {
    container
        .env
        .iter()
        .flatten()
        .find(|var| var.name == name)
        .and_then(|var| var.value.as_deref())
}

pub fn container_mut<'a>(pod: &'a mut PodSpec, name: &str) -> Option<&'a mut Container> {
    pod.containers.iter_mut().find(|c| c.name == name)
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::{
        apps::v1::DeploymentSpec,
        core::v1::PodTemplateSpec,
    };

    use super::*;

    const SIDECAR: ProxySidecar<'static> = ProxySidecar {
        image: "proxy:latest",
        proxy_host: "proxy.example.com",
        insecure: true,
        config_params_volume: "vxflexos-config-params",
    };

    fn container(name: &str) -> Container {
        Container {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn deployment(containers: Vec<Container>, volumes: Vec<Volume>) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("vxflexos-controller".into()),
                namespace: Some("vxflexos".into()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers,
                        volumes: Some(volumes),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn names(pod: &PodSpec) -> Vec<&str> {
        pod.containers.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn injects_container_volumes_and_annotation() -> anyhow::Result<()> {
        let original = deployment(
            vec![container("driver"), container("provisioner")],
            vec![Volume {
                name: "vxflexos-config-params".into(),
                ..Default::default()
            }],
        );
        let injected = SIDECAR.inject(&original, true)?;
        let pod = injected.pod_spec().unwrap();

        assert_eq!(names(pod), ["driver", "provisioner", PROXY_CONTAINER]);
        assert!(has_volume(pod, AUTH_CONFIG_VOLUME));
        assert!(has_volume(pod, ROOT_CERTIFICATE_VOLUME));
        assert_eq!(
            pod.containers[1].args.as_deref(),
            Some(&[EXTRA_CREATE_METADATA_FLAG.to_string()][..])
        );

        let proxy = &pod.containers[2];
        assert_eq!(env_value(proxy, "PLUGIN_IDENTIFIER"), Some("vxflexos"));
        assert_eq!(env_value(proxy, "INSECURE"), Some("true"));
        assert_eq!(env_value(proxy, "PROXY_HOST"), Some("proxy.example.com"));
        let mounts = proxy.volume_mounts.as_deref().unwrap_or_default();
        assert!(mounts.iter().any(|m| m.mount_path == DRIVER_CONFIG_PARAMS_MOUNT_PATH));

        let annotations = injected.metadata.annotations.unwrap_or_default();
        assert_eq!(annotations[INJECTED_ANNOTATION], "true");

        // The input is left untouched.
        assert_eq!(names(original.pod_spec().unwrap()), ["driver", "provisioner"]);
        Ok(())
    }

    #[test]
    fn reinjecting_is_idempotent() -> anyhow::Result<()> {
        let original = deployment(vec![container("driver"), container("provisioner")], vec![]);
        let once = SIDECAR.inject(&original, true)?;
        let twice = SIDECAR.inject(&once, true)?;

        let pod = twice.pod_spec().unwrap();
        assert_eq!(names(pod), ["driver", "provisioner", PROXY_CONTAINER]);
        assert_eq!(pod.volumes.as_ref().map(Vec::len), Some(2));
        assert_eq!(pod.containers[1].args.as_ref().map(Vec::len), Some(1));
        Ok(())
    }

    #[test]
    fn skips_config_params_mount_without_volume() -> anyhow::Result<()> {
        let injected = SIDECAR.inject(&deployment(vec![container("driver")], vec![]), false)?;
        let proxy = &injected.pod_spec().unwrap().containers[1];
        let mounts = proxy.volume_mounts.as_deref().unwrap_or_default();
        assert_eq!(mounts.len(), 2);
        Ok(())
    }

    #[test]
    fn plugin_identifier_prefers_metrics_containers() {
        let containers = [container("karavi-metrics-powerscale"), container("otel-collector")];
        assert_eq!(plugin_identifier("karavi", &containers), "powerscale");
        assert_eq!(plugin_identifier("karavi", &[container("karavi-metrics-unity")]), "karavi");
        assert_eq!(plugin_identifier("isilon", &[]), "isilon");
    }

    #[test]
    fn missing_pod_template_is_structural() {
        let err = SIDECAR.inject(&Deployment::default(), false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InjectError>(),
            Some(InjectError::Structural { .. })
        ));
    }

    #[test]
    fn set_env_replaces_in_place() {
        let mut driver = container("driver");
        set_env(&mut driver, "X_CSI_POWERMAX_ENDPOINT", "https://10.0.0.1:8443");
        set_env(&mut driver, "X_CSI_POWERMAX_ENDPOINT", "https://localhost:9200");
        assert_eq!(driver.env.as_ref().map(Vec::len), Some(1));
        assert_eq!(
            env_value(&driver, "X_CSI_POWERMAX_ENDPOINT"),
            Some("https://localhost:9200")
        );
    }
}
