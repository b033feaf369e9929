use crate::{
    error::InjectError,
    index::Indexes,
    manifest::Str,
    ports::Family,
    transform::{MultiArray, PowerMax, PowerScale, Strategy},
};

/// Names of the objects a run targets. `None` means the step for that object is skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectResources {
    pub deployment: Option<Str>,
    pub daemon_set: Option<Str>,
    pub secret: Option<Str>,
    pub reverse_proxy: Option<Str>,
    pub config_map: Option<Str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub strategy: Strategy,
    pub family: Family,
    pub resources: InjectResources,
    /// Namespace of the matched Deployment, used for objects created from scratch.
    pub namespace: Str,
}

struct Driver {
    deployment: &'static str,
    strategy: Strategy,
    family: Family,
    resources: fn() -> InjectResources,
}

/// Checked in order, the first Deployment present wins.
const DRIVERS: [Driver; 4] = [
    Driver {
        deployment: "vxflexos-controller",
        strategy: Strategy::MultiArray(MultiArray),
        family: Family::PowerFlex,
        resources: || InjectResources {
            deployment: Some("vxflexos-controller".into()),
            daemon_set: Some("vxflexos-node".into()),
            secret: Some("vxflexos-config".into()),
            ..Default::default()
        },
    },
    Driver {
        deployment: "powermax-controller",
        strategy: Strategy::PowerMax(PowerMax),
        family: Family::PowerMax,
        resources: || InjectResources {
            deployment: Some("powermax-controller".into()),
            daemon_set: Some("powermax-node".into()),
            secret: Some("powermax-creds".into()),
            reverse_proxy: Some("powermax-reverseproxy".into()),
            config_map: Some("powermax-reverseproxy-config".into()),
        },
    },
    Driver {
        deployment: "isilon-controller",
        strategy: Strategy::PowerScale(PowerScale),
        family: Family::PowerScale,
        resources: || InjectResources {
            deployment: Some("isilon-controller".into()),
            daemon_set: Some("isilon-node".into()),
            secret: Some("isilon-creds".into()),
            ..Default::default()
        },
    },
    Driver {
        deployment: "karavi-metrics-powerflex",
        strategy: Strategy::MultiArray(MultiArray),
        family: Family::PowerFlex,
        resources: || InjectResources {
            deployment: Some("karavi-metrics-powerflex".into()),
            secret: Some("vxflexos-config".into()),
            ..Default::default()
        },
    },
];

#[tracing::instrument(skip_all)]
pub fn detect(indexes: &Indexes) -> anyhow::Result<Detection> {
    for driver in &DRIVERS {
        let Some(deployment) = indexes.deployments.get(driver.deployment) else {
            continue;
        };

        let namespace: Str = deployment.metadata.namespace.as_deref().unwrap_or_default().into();
        tracing::info!(
            deployment = driver.deployment,
            family = %driver.family,
            %namespace,
            "detected driver"
        );

        return Ok(Detection {
            strategy: driver.strategy,
            family: driver.family,
            resources: (driver.resources)(),
            namespace,
        });
    }

    Err(InjectError::UnknownDriver.into())
}
