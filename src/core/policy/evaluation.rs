use serde::{Deserialize, Serialize};

use crate::core::common::VmMigration;
use crate::core::resource_model::{HostsInfo, Vm};
use crate::error::Result;

/// Cost of a single proposed migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CostPolicy {
    #[default]
    VmMemory,
}

impl CostPolicy {
    pub fn cost(&self, vm: &Vm) -> f64 {
        match self {
            CostPolicy::VmMemory => vm.memory,
        }
    }
}

/// Reward of a proposed migration list, evaluated against the snapshot
/// before and after simulating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RewardPolicy {
    #[default]
    Zero,
    PlanLength,
    /// Negative variance of per-host free-E after the list is applied;
    /// rewards distributions that end up flatter.
    NegativeVariance,
}

impl RewardPolicy {
    pub fn reward(
        &self,
        migrations: &[VmMigration],
        after: &HostsInfo,
        weight_mem: f64,
        weight_cpu: f64,
    ) -> Result<f64> {
        match self {
            RewardPolicy::Zero => Ok(0.0),
            RewardPolicy::PlanLength => Ok(migrations.len() as f64),
            RewardPolicy::NegativeVariance => {
                Ok(-free_e_variance(after, weight_mem, weight_cpu)?)
            }
        }
    }
}

pub fn free_e_variance(hosts_info: &HostsInfo, weight_mem: f64, weight_cpu: f64) -> Result<f64> {
    let mut values = Vec::with_capacity(hosts_info.hosts.len());
    for hostname in hosts_info.hosts.keys() {
        values.push(hosts_info.euclid_free(hostname, weight_mem, weight_cpu)?);
    }
    if values.is_empty() {
        return Ok(0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Ok(variance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource_model::Host;

    #[test]
    fn variance_is_zero_for_uniform_cluster() {
        let mut hi = HostsInfo::new();
        hi.insert_host(Host::new("a", 4.0, 8.0));
        hi.insert_host(Host::new("b", 4.0, 8.0));
        hi.normalize().unwrap();
        let v = free_e_variance(&hi, 1.0, 1.0).unwrap();
        assert!(v.abs() < 1e-9);
    }
}
