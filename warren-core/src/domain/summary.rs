//! Job summaries
//!
//! Flat listing row for a job with its utilization figures already
//! aggregated across every allocation of its topology.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::job::{Job, JobId, JobState};
use crate::domain::topology::{ProcessGroup, ResourceKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub user_id: i64,
    pub description: String,
    pub state: JobState,
    pub rank: i32,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub since: Option<DateTime<Utc>>,
    pub util_compute: f64,
    pub util_compute_samples: i64,
    pub util_memory: f64,
    pub util_memory_samples: i64,
    /// Average of the latest compute samples, if any were taken
    pub current_util_compute: Option<f64>,
    /// Average of the latest memory samples, if any were taken
    pub current_util_memory: Option<f64>,
}

impl JobSummary {
    /// Builds a summary by folding the utilization of every allocation
    pub fn from_topology(job: &Job, groups: &[ProcessGroup]) -> Self {
        let mut compute = Aggregate::default();
        let mut memory = Aggregate::default();

        let utilizations = groups
            .iter()
            .flat_map(|g| &g.processes)
            .flat_map(|p| &p.allocations)
            .flat_map(|a| &a.utilizations);

        for u in utilizations {
            match u.kind {
                ResourceKind::Compute => compute.add(u.aggregated, u.samples, u.current),
                ResourceKind::Memory => memory.add(u.aggregated, u.samples, u.current),
                ResourceKind::Cuda => {}
            }
        }

        Self {
            id: job.id,
            user_id: job.user_id,
            description: job.description.clone(),
            state: job.state,
            rank: job.rank,
            since: job.since,
            util_compute: compute.aggregated,
            util_compute_samples: compute.samples,
            util_memory: memory.aggregated,
            util_memory_samples: memory.samples,
            current_util_compute: compute.current_avg(),
            current_util_memory: memory.current_avg(),
        }
    }
}

#[derive(Default)]
struct Aggregate {
    aggregated: f64,
    samples: i64,
    current_sum: f64,
    count: u32,
}

impl Aggregate {
    fn add(&mut self, aggregated: f64, samples: i64, current: f64) {
        self.aggregated += aggregated;
        self.samples += samples;
        self.current_sum += current;
        self.count += 1;
    }

    fn current_avg(&self) -> Option<f64> {
        (self.count > 0).then(|| self.current_sum / f64::from(self.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::topology::{Allocation, Process, Resource, Utilization};

    fn job() -> Job {
        Job {
            id: 7,
            user_id: 1,
            description: "train".to_string(),
            provisioning: String::new(),
            request: "1:gpu".to_string(),
            state: JobState::Running,
            rank: 0,
            allocation: None,
            continues: None,
            since: None,
        }
    }

    fn allocation(utilizations: Vec<Utilization>) -> Allocation {
        Allocation {
            id: 1,
            resource: Resource {
                id: 1,
                node_id: "n1".to_string(),
                kind: ResourceKind::Cuda,
                index: 0,
            },
            utilizations,
        }
    }

    fn util(kind: ResourceKind, aggregated: f64, samples: i64, current: f64) -> Utilization {
        Utilization {
            kind,
            aggregated,
            samples,
            current,
        }
    }

    #[test]
    fn test_summary_without_topology() {
        let summary = JobSummary::from_topology(&job(), &[]);
        assert_eq!(summary.util_compute, 0.0);
        assert_eq!(summary.util_memory_samples, 0);
        assert_eq!(summary.current_util_compute, None);
        assert_eq!(summary.state, JobState::Running);
    }

    #[test]
    fn test_summary_sums_across_processes() {
        let groups = vec![ProcessGroup {
            index: 0,
            processes: vec![
                Process {
                    index: 0,
                    node_id: "n1".to_string(),
                    allocations: vec![allocation(vec![
                        util(ResourceKind::Compute, 10.0, 4, 0.5),
                        util(ResourceKind::Memory, 2.0, 4, 0.25),
                    ])],
                },
                Process {
                    index: 1,
                    node_id: "n2".to_string(),
                    allocations: vec![allocation(vec![util(ResourceKind::Compute, 6.0, 2, 1.0)])],
                },
            ],
        }];

        let summary = JobSummary::from_topology(&job(), &groups);
        assert_eq!(summary.util_compute, 16.0);
        assert_eq!(summary.util_compute_samples, 6);
        assert_eq!(summary.util_memory, 2.0);
        assert_eq!(summary.current_util_compute, Some(0.75));
        assert_eq!(summary.current_util_memory, Some(0.25));
    }
}
