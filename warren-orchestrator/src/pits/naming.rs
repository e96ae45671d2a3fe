//! Container and network naming
//!
//! Pit membership is never stored. A container belongs to a pit because its
//! name says so: `pit-<nodeId>-<pitId>-<instance>`, where the instance is
//! `d` for the daemon or the worker's ordinal.

use std::fmt;
use std::str::FromStr;

use warren_core::domain::job::JobId;
use warren_core::domain::node::Node;

pub const PREFIX: &str = "pit";

/// Suffix turning a container name into its hostname on the overlay network
pub const HOST_SUFFIX: &str = ".lxd";

const DAEMON_TAG: &str = "d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instance {
    Daemon,
    Worker(usize),
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instance::Daemon => f.write_str(DAEMON_TAG),
            Instance::Worker(index) => write!(f, "{}", index),
        }
    }
}

impl FromStr for Instance {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == DAEMON_TAG {
            return Ok(Instance::Daemon);
        }
        // Ordinals are canonical: no sign, no leading zeros
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) || (s.len() > 1 && s.starts_with('0')) {
            return Err(());
        }
        s.parse().map(Instance::Worker).map_err(|_| ())
    }
}

/// A parsed container name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerName {
    pub node_id: String,
    pub pit_id: JobId,
    pub instance: Instance,
}

impl ContainerName {
    pub fn new(node_id: impl Into<String>, pit_id: JobId, instance: Instance) -> Self {
        Self {
            node_id: node_id.into(),
            pit_id,
            instance,
        }
    }

    pub fn daemon(node: &Node, pit_id: JobId) -> Self {
        Self::new(&node.id, pit_id, Instance::Daemon)
    }

    pub fn worker(node: &Node, pit_id: JobId, index: usize) -> Self {
        Self::new(&node.id, pit_id, Instance::Worker(index))
    }

    /// Parses a container name; `None` for containers that are not pit members
    pub fn parse(name: &str) -> Option<Self> {
        let mut parts = name.split('-');
        let (prefix, node_id, pit_id, instance) =
            (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || prefix != PREFIX || !Node::is_valid_id(node_id) {
            return None;
        }
        if pit_id.is_empty() || !pit_id.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        Some(Self {
            node_id: node_id.to_string(),
            pit_id: pit_id.parse().ok()?,
            instance: instance.parse().ok()?,
        })
    }

    /// Hostname of the container inside the pit
    pub fn host(&self) -> String {
        format!("{}{}", self, HOST_SUFFIX)
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}-{}", PREFIX, self.node_id, self.pit_id, self.instance)
    }
}

/// Hostname of a pit's worker, as exported to the job's environment
pub fn worker_host(pit_id: JobId, node: &Node, index: usize) -> String {
    ContainerName::worker(node, pit_id, index).host()
}

/// Name of a pit's overlay network; the same on every node it spans
pub fn network_name(pit_id: JobId) -> String {
    format!("{}{}", PREFIX, pit_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> Node {
        Node::new(id, "https://10.0.0.1:8443").unwrap()
    }

    #[test]
    fn test_names_round_trip() {
        let names = [
            ContainerName::daemon(&node("head"), 7),
            ContainerName::worker(&node("n1"), 7, 0),
            ContainerName::worker(&node("gpu12"), 123456, 42),
        ];
        for name in names {
            assert_eq!(ContainerName::parse(&name.to_string()), Some(name));
        }
    }

    #[test]
    fn test_name_layout() {
        assert_eq!(ContainerName::daemon(&node("head"), 3).to_string(), "pit-head-3-d");
        assert_eq!(ContainerName::worker(&node("n2"), 3, 10).to_string(), "pit-n2-3-10");
        assert_eq!(worker_host(3, &node("n2"), 1), "pit-n2-3-1.lxd");
        assert_eq!(network_name(3), "pit3");
    }

    #[test]
    fn test_foreign_names_are_ignored() {
        for name in [
            "web",
            "pit-head-3",
            "pit-head-3-d-x",
            "sp-head-3-d",
            "pit-Head-3-d",
            "pit-1head-3-d",
            "pit-head--d",
            "pit-head-x-d",
            "pit-head-3-01",
            "pit-head-3-",
            "pit-head-3-e",
        ] {
            assert_eq!(ContainerName::parse(name), None, "{}", name);
        }
    }
}
