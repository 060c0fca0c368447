use serde::{Deserialize, Serialize};

use crate::core::resource_model::{Host, HostsInfo};
use crate::error::Result;

/// Picks the next host (from hosts that currently hold >=1 VM) whose VMs
/// the defragmenter will try to evict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostSelectorPolicy {
    FirstFit,
    MoreVmsFirst,
    LessVmsFirst,
    MoreUsedFirst,
    LessUsedFirst,
}

impl HostSelectorPolicy {
    /// `candidates` must already be filtered to hosts with >=1 VM.
    pub fn select<'a>(
        &self,
        candidates: &[&'a Host],
        hosts_info: &HostsInfo,
        weight_mem: f64,
        weight_cpu: f64,
    ) -> Result<Option<&'a Host>> {
        let mut ranked: Vec<(f64, &Host)> = Vec::with_capacity(candidates.len());
        for (position, host) in candidates.iter().enumerate() {
            let rank = match self {
                HostSelectorPolicy::FirstFit => -(position as f64),
                HostSelectorPolicy::MoreVmsFirst => host.vms.len() as f64,
                HostSelectorPolicy::LessVmsFirst => -(host.vms.len() as f64),
                HostSelectorPolicy::MoreUsedFirst => {
                    -hosts_info.euclid_free(&host.hostname, weight_mem, weight_cpu)?
                }
                HostSelectorPolicy::LessUsedFirst => {
                    hosts_info.euclid_free(&host.hostname, weight_mem, weight_cpu)?
                }
            };
            ranked.push((rank, host));
        }
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(ranked.first().map(|(_, h)| *h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource_model::Vm;

    #[test]
    fn more_vms_first_picks_fullest() {
        let mut hi = HostsInfo::new();
        let mut a = Host::new("a", 4.0, 8.0);
        a.add_vm(Vm::new(1, 1.0, 1.0, "a", 0));
        let mut b = Host::new("b", 4.0, 8.0);
        b.add_vm(Vm::new(2, 1.0, 1.0, "b", 0));
        b.add_vm(Vm::new(3, 1.0, 1.0, "b", 0));
        hi.insert_host(a);
        hi.insert_host(b);
        hi.normalize().unwrap();

        let a_ref = &hi.hosts["a"];
        let b_ref = &hi.hosts["b"];
        let picked = HostSelectorPolicy::MoreVmsFirst
            .select(&[a_ref, b_ref], &hi, 1.0, 1.0)
            .unwrap();
        assert_eq!(picked.unwrap().hostname, "b");
    }
}
