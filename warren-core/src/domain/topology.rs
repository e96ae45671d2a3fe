//! Process topology
//!
//! A job owns ordered process groups, each owning ordered processes. A
//! process is placed on one node and holds allocations of that node's
//! physical resources. The scheduler reads this when it starts a job.

use serde::{Deserialize, Serialize};

/// Kind of a physical resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Compute,
    Memory,
    Cuda,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Compute => "compute",
            ResourceKind::Memory => "memory",
            ResourceKind::Cuda => "cuda",
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compute" => Ok(ResourceKind::Compute),
            "memory" => Ok(ResourceKind::Memory),
            "cuda" => Ok(ResourceKind::Cuda),
            other => Err(format!("unknown resource type: {}", other)),
        }
    }
}

/// One physical resource unit on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: i64,
    pub node_id: String,
    pub kind: ResourceKind,
    /// Node-local index (e.g. the GPU number)
    pub index: i32,
}

/// Sampled utilization attached to an allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utilization {
    pub kind: ResourceKind,
    pub aggregated: f64,
    pub samples: i64,
    pub current: f64,
}

/// Binding of a process to one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: i64,
    pub resource: Resource,
    pub utilizations: Vec<Utilization>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub index: i32,
    pub node_id: String,
    pub allocations: Vec<Allocation>,
}

impl Process {
    /// Node-local indices of the GPUs allocated to this process
    pub fn cuda_indices(&self) -> impl Iterator<Item = i32> + '_ {
        self.allocations
            .iter()
            .filter(|a| a.resource.kind == ResourceKind::Cuda)
            .map(|a| a.resource.index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessGroup {
    pub index: i32,
    pub processes: Vec<Process>,
}
