//! Plugin interface, metadata, lifecycle states, and version constraints.

use aether::{Error, ErrorKind, Result};
use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Version { major, minor, patch }
    }

    pub fn parse(text: &str) -> Result<Version> {
        let mut parts = text.trim().splitn(3, '.');
        let parse_part = |part: Option<&str>| -> Result<u32> {
            part.and_then(|p| p.parse().ok())
                .ok_or_else(|| Error::new(ErrorKind::InvalidArgument, format!("invalid version: {text}")))
        };
        Ok(Version {
            major: parse_part(parts.next())?,
            minor: parse_part(parts.next())?,
            patch: parse_part(parts.next())?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Operator {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
    Compatible,
}

#[derive(Clone, Debug)]
pub struct VersionConstraint {
    pub op: Operator,
    pub version: Version,
}

impl VersionConstraint {
    pub fn is_satisfied_by(&self, v: Version) -> bool {
        match self.op {
            Operator::Ge => v >= self.version,
            Operator::Gt => v > self.version,
            Operator::Le => v <= self.version,
            Operator::Lt => v < self.version,
            Operator::Eq => v == self.version,
            Operator::Compatible => v >= self.version && v.major == self.version.major,
        }
    }

    /// Parse a single constraint like `>=1.2.0`, `~=1.2.0`, `==2.0.0`.
    fn parse(text: &str) -> Result<VersionConstraint> {
        let text = text.trim();
        let (op, rest) = if let Some(rest) = text.strip_prefix(">=") {
            (Operator::Ge, rest)
        } else if let Some(rest) = text.strip_prefix("<=") {
            (Operator::Le, rest)
        } else if let Some(rest) = text.strip_prefix("==") {
            (Operator::Eq, rest)
        } else if let Some(rest) = text.strip_prefix("~=") {
            (Operator::Compatible, rest)
        } else if let Some(rest) = text.strip_prefix('>') {
            (Operator::Gt, rest)
        } else if let Some(rest) = text.strip_prefix('<') {
            (Operator::Lt, rest)
        } else {
            return Err(Error::new(ErrorKind::InvalidArgument, format!("unrecognized constraint: {text}")));
        };

        Ok(VersionConstraint {
            op,
            version: Version::parse(rest)?,
        })
    }
}

/// `name` plus zero or more comma-separated constraints; parsing stops at
/// the first operator character for the name.
#[derive(Clone, Debug)]
pub struct DependencySpec {
    pub name: String,
    pub constraints: Vec<VersionConstraint>,
}

const OPERATOR_CHARS: &[char] = &['>', '<', '='];

impl DependencySpec {
    pub fn parse(text: &str) -> Result<DependencySpec> {
        let text = text.trim();
        let name_end = text.find(OPERATOR_CHARS).unwrap_or(text.len());
        let name = text[..name_end].trim().to_string();
        if name.is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgument, "dependency spec has no name"));
        }

        let remainder = text[name_end..].trim();
        let constraints = if remainder.is_empty() {
            Vec::new()
        } else {
            remainder
                .split(',')
                .map(VersionConstraint::parse)
                .collect::<Result<Vec<_>>>()?
        };

        Ok(DependencySpec { name, constraints })
    }

    pub fn is_satisfied_by(&self, v: Version) -> bool {
        self.constraints.iter().all(|c| c.is_satisfied_by(v))
    }
}

#[derive(Clone, Debug)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
    pub version: Version,
    pub dependencies: Vec<String>,
    pub api_version: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PluginState {
    Unloaded,
    Loaded,
    Initialized,
    Active,
    ShuttingDown,
    Error,
}

/// Opaque plugin-owned state captured for hot reload.
#[derive(Clone, Debug)]
pub struct StateSnapshot {
    pub plugin_version: Version,
    pub state_version: u32,
    pub bytes: Vec<u8>,
    pub captured_at: u64,
}

/// The five lifecycle callbacks plus metadata. The three state methods are
/// optional: a plugin with no state to preserve across a hot reload leaves
/// them at their default (`None` / `false` / `0`).
pub trait Plugin: Send + Sync {
    fn info(&self) -> PluginInfo;
    fn on_load(&mut self, ctx: &PluginContext) -> bool;
    fn on_init(&mut self) -> bool;
    fn on_update(&mut self, dt: f64);
    fn on_shutdown(&mut self);
    fn on_unload(&mut self);

    fn serialize_state(&self) -> Option<Vec<u8>> {
        None
    }
    fn deserialize_state(&mut self, _bytes: &[u8]) -> bool {
        false
    }
    fn state_version(&self) -> u32 {
        0
    }
}

/// Borrowed context handed to `on_load`. Plugins must not retain this past
/// `on_unload`.
pub struct PluginContext<'a> {
    pub log: &'a slog::Logger,
}
