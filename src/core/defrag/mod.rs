pub mod best_fit;
pub mod distribute_refill;
pub mod first_fit;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::policy::PolicySet;
use crate::core::resource_model::{HostsInfo, VmState};
use crate::error::Result;

/// Shared knobs every defragmenter is built from. The three policy axes
/// are fields on this struct, not a type hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefraggerConfig {
    pub policies: PolicySet,
    pub weight_mem: f64,
    pub weight_cpu: f64,
    pub stable_time: u64,
    pub disabled_hosts: Vec<String>,
    /// Allow a currently-empty host to be used as a migration destination.
    pub use_empty_as_destination: bool,
    pub max_iterations: Option<u32>,
}

impl Default for DefraggerConfig {
    fn default() -> Self {
        Self {
            policies: PolicySet::default(),
            weight_mem: 1.0,
            weight_cpu: 1.0,
            stable_time: 600,
            disabled_hosts: Vec::new(),
            use_empty_as_destination: false,
            max_iterations: None,
        }
    }
}

pub(crate) struct PreparedCluster {
    pub snapshot: HostsInfo,
    pub hosts_to_empty: Vec<String>,
}

/// Common pre-steps shared by every defragmenter: clone + normalize the
/// snapshot, then compute and filter the candidate set of hosts to empty.
pub(crate) fn prepare(
    snapshot: &HostsInfo,
    hosts_fixed: &[String],
    vms_fixed: &[u32],
    now: u64,
    config: &DefraggerConfig,
) -> Result<PreparedCluster> {
    let mut working = snapshot.clone();
    working.normalize()?;

    let hosts_fixed_set: HashSet<&str> = hosts_fixed.iter().map(String::as_str).collect();
    let vms_fixed_set: HashSet<u32> = vms_fixed.iter().copied().collect();

    let mut hosts_to_empty = Vec::new();
    for (hostname, host) in &working.hosts {
        if hosts_fixed_set.contains(hostname.as_str()) {
            continue;
        }
        if config.disabled_hosts.iter().any(|d| d == hostname) {
            continue;
        }
        if host.vms.iter().any(|vm| vms_fixed_set.contains(&vm.id)) {
            continue;
        }
        let unstable = host
            .vms
            .iter()
            .any(|vm| vm.state == VmState::Running && now.saturating_sub(vm.timestamp_state) < config.stable_time);
        if unstable {
            continue;
        }
        hosts_to_empty.push(hostname.clone());
    }

    Ok(PreparedCluster {
        snapshot: working,
        hosts_to_empty,
    })
}
