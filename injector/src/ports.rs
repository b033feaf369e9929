//! Starting local ports per driver family.
//!
//! Each family's sidecar listens on consecutive ports starting at its entry here, one per backend
//! connection. Families are spaced `STRIDE` apart so their ranges do not collide as long as no
//! family has more than `STRIDE` connections.

use std::{fmt, str::FromStr};

use anyhow::{Context, anyhow};

pub const DEFAULT_STARTING_PORT: u16 = 9000;
pub const STRIDE: u16 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    PowerFlex,
    PowerMax,
    PowerScale,
}

impl Family {
    /// In port order.
    pub const ALL: [Family; 3] = [Family::PowerFlex, Family::PowerMax, Family::PowerScale];

    pub fn as_str(self) -> &'static str {
        match self {
            Family::PowerFlex => "powerflex",
            Family::PowerMax => "powermax",
            Family::PowerScale => "powerscale",
        }
    }

    fn position(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Family::ALL
            .into_iter()
            .find(|family| family.as_str() == s)
            .ok_or_else(|| {
                anyhow!(
                    "unknown storage family `{s}`, expected one of {}",
                    Family::ALL.map(Family::as_str).join(", ")
                )
            })
    }
}

/// A `family=port` override as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortOverride {
    pub family: Family,
    pub port: u16,
}

impl FromStr for PortOverride {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (family, port) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid proxy port `{s}`, expected `<family>=<port>`"))?;
        let family = family.trim().parse()?;
        let port = port
            .trim()
            .parse()
            .with_context(|| format!("invalid port number in `{s}`"))?;
        Ok(PortOverride { family, port })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRanges {
    starts: [u16; 3],
}

impl Default for PortRanges {
    fn default() -> Self {
        Self {
            starts: Family::ALL.map(|family| {
                DEFAULT_STARTING_PORT + STRIDE * family.position() as u16
            }),
        }
    }
}

impl PortRanges {
    pub fn start(&self, family: Family) -> u16 {
        self.starts[family.position()]
    }

    /// Parses `family=port` tokens and fills in every family that was not given.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> anyhow::Result<Self> {
        let overrides = tokens
            .iter()
            .map(|token| token.as_ref().parse())
            .collect::<anyhow::Result<Vec<PortOverride>>>()?;
        Self::from_overrides(&overrides)
    }

    /// With no overrides every family gets its default. Otherwise the first given family in port
    /// order is the anchor: earlier families step down from it one stride per position, later
    /// families step up from it by their position in the order. Given ports are never changed.
    pub fn from_overrides(overrides: &[PortOverride]) -> anyhow::Result<Self> {
        let mut given: [Option<u16>; 3] = [None; 3];
        for o in overrides {
            given[o.family.position()] = Some(o.port);
        }

        let Some((anchor, anchor_port)) = Family::ALL
            .into_iter()
            .find_map(|f| given[f.position()].map(|port| (f, port)))
        else {
            return Ok(Self::default());
        };

        let mut starts = [0; 3];
        for family in Family::ALL {
            let i = family.position();
            starts[i] = match given[i] {
                Some(port) => port,
                None if i < anchor.position() => {
                    let distance = (anchor.position() - i) as u16;
                    anchor_port.checked_sub(STRIDE * distance).ok_or_else(|| {
                        anyhow!("{family} ports would start below 0 when derived from {anchor}={anchor_port}")
                    })?
                }
                None => anchor_port.checked_add(STRIDE * i as u16).ok_or_else(|| {
                    anyhow!("{family} ports would exceed 65535 when derived from {anchor}={anchor_port}")
                })?,
            };
        }

        tracing::debug!(?starts, %anchor, "allocated starting ports");
        Ok(Self { starts })
    }
}
