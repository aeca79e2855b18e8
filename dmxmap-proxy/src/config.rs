//! Configuration loading and compilation.
//!
//! The TOML file declares an ordered list of `[[mapping]]` blocks and an
//! unordered list of `[[target]]` blocks. Mapping endpoints accept either the
//! address grammar (`"artnet:0.0.1:50-100"`) or a bare integer, which means
//! "that Art-Net universe, full range" for a source and "channel 1" for a
//! destination. Compilation validates every rule and produces the normalized,
//! zero-indexed table the remap engine runs on.

use std::collections::{HashMap, HashSet};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use dmxmap_protocol::{artnet, sacn, AddressError, FromAddress, Protocol, ToAddress, Universe};

/// Fatal configuration errors. All of these stop the process before serving.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("mapping {index}: {source}")]
    Mapping {
        index: usize,
        source: AddressError,
    },

    #[error("mapping {index}: destination channel {to_start} plus {span} source channels exceeds 512")]
    MappingOverrun {
        index: usize,
        to_start: u16,
        span: u16,
    },

    #[error("target {index}: {source}")]
    TargetUniverse {
        index: usize,
        source: AddressError,
    },

    #[error("target {universe}: address must not be empty")]
    EmptyTargetAddress { universe: Universe },

    #[error("target {universe}: cannot resolve {address:?}")]
    TargetResolve { universe: Universe, address: String },

    #[error("duplicate artnet target for universe {0}")]
    DuplicateArtNetTarget(Universe),
}

/// A mapping endpoint as authored: bare universe number or address text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EndpointSpec {
    Number(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default, rename = "mapping")]
    mappings: Vec<RawMapping>,
    #[serde(default, rename = "target")]
    targets: Vec<RawTarget>,
}

#[derive(Debug, Deserialize)]
struct RawMapping {
    from: EndpointSpec,
    to: EndpointSpec,
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    universe: EndpointSpec,
    address: String,
}

/// A validated channel mapping, kept in authored form for logs and the API.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Mapping {
    pub from: FromAddress,
    pub to: ToAddress,
}

/// A validated unicast target.
#[derive(Debug, Clone, Serialize)]
pub struct Target {
    pub universe: Universe,
    pub address: SocketAddr,
}

/// A compiled mapping, zero-indexed, ready for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedMapping {
    pub from: Universe,
    pub from_chan: usize,
    pub to: Universe,
    pub to_chan: usize,
    pub count: usize,
}

/// The loaded configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub mappings: Vec<Mapping>,
    pub targets: Vec<Target>,
}

impl Config {
    /// Load and compile a TOML configuration file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        compile(raw)
    }

    /// Compile a TOML string (tests and embedded defaults).
    pub fn parse(contents: &str) -> Result<Config, ConfigError> {
        let raw: RawConfig = toml::from_str(contents).map_err(|source| ConfigError::Toml {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        compile(raw)
    }

    /// The normalized, zero-indexed mapping table, in authored order.
    pub fn normalized(&self) -> Vec<NormalizedMapping> {
        self.mappings
            .iter()
            .map(|m| NormalizedMapping {
                from: m.from.universe,
                from_chan: usize::from(m.from.channel_start) - 1,
                to: m.to.universe,
                to_chan: usize::from(m.to.channel_start) - 1,
                count: usize::from(m.from.span()),
            })
            .collect()
    }

    /// Art-Net targets keyed by universe number. Uniqueness is enforced at
    /// compile time.
    pub fn artnet_targets(&self) -> HashMap<u16, SocketAddr> {
        self.targets
            .iter()
            .filter(|t| t.universe.protocol == Protocol::ArtNet)
            .map(|t| (t.universe.number, t.address))
            .collect()
    }

    /// sACN unicast targets per universe number; several per universe are
    /// legal.
    pub fn sacn_targets(&self) -> HashMap<u16, Vec<SocketAddr>> {
        let mut map: HashMap<u16, Vec<SocketAddr>> = HashMap::new();
        for t in &self.targets {
            if t.universe.protocol == Protocol::Sacn {
                map.entry(t.universe.number).or_default().push(t.address);
            }
        }
        map
    }
}

fn compile(raw: RawConfig) -> Result<Config, ConfigError> {
    let mut mappings = Vec::with_capacity(raw.mappings.len());
    for (index, m) in raw.mappings.iter().enumerate() {
        let from = from_endpoint(&m.from).map_err(|source| ConfigError::Mapping { index, source })?;
        let to = to_endpoint(&m.to).map_err(|source| ConfigError::Mapping { index, source })?;

        // The source range must fit at the destination start channel.
        if to.channel_start + from.span() - 1 > 512 {
            return Err(ConfigError::MappingOverrun {
                index,
                to_start: to.channel_start,
                span: from.span(),
            });
        }
        mappings.push(Mapping { from, to });
    }

    let mut targets = Vec::with_capacity(raw.targets.len());
    let mut seen_artnet: HashSet<u16> = HashSet::new();
    for (index, t) in raw.targets.iter().enumerate() {
        let universe = universe_endpoint(&t.universe)
            .map_err(|source| ConfigError::TargetUniverse { index, source })?;
        if t.address.trim().is_empty() {
            return Err(ConfigError::EmptyTargetAddress { universe });
        }
        let default_port = match universe.protocol {
            Protocol::ArtNet => artnet::PORT,
            Protocol::Sacn => sacn::PORT,
        };
        let address = resolve_addr(t.address.trim(), default_port).ok_or_else(|| {
            ConfigError::TargetResolve {
                universe,
                address: t.address.clone(),
            }
        })?;
        if universe.protocol == Protocol::ArtNet && !seen_artnet.insert(universe.number) {
            return Err(ConfigError::DuplicateArtNetTarget(universe));
        }
        targets.push(Target { universe, address });
    }

    Ok(Config { mappings, targets })
}

fn from_endpoint(spec: &EndpointSpec) -> Result<FromAddress, AddressError> {
    match spec {
        EndpointSpec::Number(n) => Ok(FromAddress::full(Universe::new(Protocol::ArtNet, *n)?)),
        EndpointSpec::Text(s) => s.parse(),
    }
}

fn to_endpoint(spec: &EndpointSpec) -> Result<ToAddress, AddressError> {
    match spec {
        EndpointSpec::Number(n) => Ok(ToAddress::start(Universe::new(Protocol::ArtNet, *n)?)),
        EndpointSpec::Text(s) => s.parse(),
    }
}

fn universe_endpoint(spec: &EndpointSpec) -> Result<Universe, AddressError> {
    match spec {
        EndpointSpec::Number(n) => Universe::new(Protocol::ArtNet, *n),
        EndpointSpec::Text(s) => s.parse(),
    }
}

/// Resolve `host[:port]` to a UDP endpoint, appending the protocol default
/// port when none is given. Hostnames go through the system resolver.
pub fn resolve_addr(address: &str, default_port: u16) -> Option<SocketAddr> {
    let candidate = if address.contains(':') {
        address.to_string()
    } else {
        format!("{address}:{default_port}")
    };
    candidate.to_socket_addrs().ok()?.next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_string_and_integer_endpoints() {
        let cfg = Config::parse(
            r#"
            [[mapping]]
            from = "artnet:0.0.1:50-100"
            to = "sacn:1:10"

            [[mapping]]
            from = 2
            to = 3
            "#,
        )
        .unwrap();

        let table = cfg.normalized();
        assert_eq!(table.len(), 2);

        assert_eq!(table[0].from, "artnet:0.0.1".parse().unwrap());
        assert_eq!(table[0].from_chan, 49);
        assert_eq!(table[0].to, Universe::sacn(1));
        assert_eq!(table[0].to_chan, 9);
        assert_eq!(table[0].count, 51);

        // Bare integers: Art-Net, full range / channel 1.
        assert_eq!(table[1].from, Universe::artnet(2));
        assert_eq!(table[1].from_chan, 0);
        assert_eq!(table[1].to, Universe::artnet(3));
        assert_eq!(table[1].to_chan, 0);
        assert_eq!(table[1].count, 512);
    }

    #[test]
    fn normalized_table_bounds_always_hold() {
        let cfg = Config::parse(
            r#"
            [[mapping]]
            from = "artnet:0:100-200"
            to = "artnet:1:50"

            [[mapping]]
            from = "sacn:1:512"
            to = "sacn:2:1"

            [[mapping]]
            from = "artnet:0:300-"
            to = "artnet:2:100"
            "#,
        )
        .unwrap();

        for m in cfg.normalized() {
            assert!(m.count >= 1);
            assert!(m.from_chan + m.count <= 512);
            assert!(m.to_chan + m.count <= 512);
        }
    }

    #[test]
    fn mapping_errors_carry_the_index() {
        let err = Config::parse(
            r#"
            [[mapping]]
            from = "artnet:0"
            to = "artnet:1"

            [[mapping]]
            from = "artnet:0:0-10"
            to = "artnet:1"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Mapping { index: 1, .. }));

        let err = Config::parse(
            r#"
            [[mapping]]
            from = "sacn:64000"
            to = "artnet:1"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Mapping { index: 0, .. }));
    }

    #[test]
    fn destination_overrun_is_rejected() {
        let err = Config::parse(
            r#"
            [[mapping]]
            from = "artnet:0:1-100"
            to = "artnet:1:500"
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MappingOverrun {
                index: 0,
                to_start: 500,
                span: 100,
            }
        ));

        // Exactly fitting is fine: 413 + 100 - 1 = 512.
        assert!(Config::parse(
            r#"
            [[mapping]]
            from = "artnet:0:1-100"
            to = "artnet:1:413"
            "#,
        )
        .is_ok());
    }

    #[test]
    fn fan_out_and_merge_are_legal() {
        let cfg = Config::parse(
            r#"
            [[mapping]]
            from = "artnet:0"
            to = "artnet:1"

            [[mapping]]
            from = "artnet:0"
            to = "sacn:1"

            [[mapping]]
            from = "artnet:5:1-10"
            to = "artnet:1:1"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.normalized().len(), 3);
    }

    #[test]
    fn targets_resolve_with_protocol_default_ports() {
        let cfg = Config::parse(
            r#"
            [[target]]
            universe = "artnet:0.0.2"
            address = "10.1.2.3"

            [[target]]
            universe = "sacn:7"
            address = "10.1.2.4:9999"

            [[target]]
            universe = "sacn:7"
            address = "10.1.2.5"
            "#,
        )
        .unwrap();

        let art = cfg.artnet_targets();
        assert_eq!(art[&2], "10.1.2.3:6454".parse().unwrap());

        let sacn = cfg.sacn_targets();
        assert_eq!(
            sacn[&7],
            vec![
                "10.1.2.4:9999".parse().unwrap(),
                "10.1.2.5:5568".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn target_validation_errors() {
        let err = Config::parse(
            r#"
            [[target]]
            universe = "artnet:0"
            address = ""
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyTargetAddress { .. }));

        let err = Config::parse(
            r#"
            [[target]]
            universe = "midi:0"
            address = "10.0.0.1"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::TargetUniverse { index: 0, .. }));

        let err = Config::parse(
            r#"
            [[target]]
            universe = "artnet:0"
            address = "10.0.0.1"

            [[target]]
            universe = "artnet:0"
            address = "10.0.0.2"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateArtNetTarget(_)));
    }

    #[test]
    fn empty_config_is_valid() {
        let cfg = Config::parse("").unwrap();
        assert!(cfg.mappings.is_empty());
        assert!(cfg.targets.is_empty());
        assert!(cfg.normalized().is_empty());
    }
}
