use std::collections::HashSet;

use crate::core::common::{EvaluatedPlan, MigrationPlanValue, VmMigration};
use crate::core::defrag::{prepare, DefraggerConfig};
use crate::core::resource_model::{Host, HostsInfo};
use crate::error::Result;

/// Repeatedly picks a host to empty and tries to evacuate every one of its
/// VMs onto other hosts. A host's evacuation list is accepted only if it
/// frees every VM it held; otherwise none of the simulated moves for that
/// host are kept.
pub fn defrag(
    snapshot: &HostsInfo,
    hosts_fixed: &[String],
    vms_fixed: &[u32],
    now: u64,
    config: &DefraggerConfig,
) -> Result<MigrationPlanValue> {
    let prepared = prepare(snapshot, hosts_fixed, vms_fixed, now, config)?;
    let mut working = prepared.snapshot;
    let mut hosts_to_empty = prepared.hosts_to_empty;
    let mut plan = MigrationPlanValue::default();
    let mut iterations = 0u32;

    loop {
        if hosts_to_empty.is_empty() {
            break;
        }
        if let Some(max) = config.max_iterations {
            if iterations >= max {
                break;
            }
        }

        let candidates: Vec<&Host> = hosts_to_empty
            .iter()
            .filter_map(|name| working.hosts.get(name))
            .collect();
        let Some(picked) =
            config
                .policies
                .host_selector
                .select(&candidates, &working, config.weight_mem, config.weight_cpu)?
        else {
            break;
        };
        let picked_name = picked.hostname.clone();

        let (evacuated, trial) = try_evacuate(&working, &picked_name, config)?;

        if let Some(migrations) = evacuated {
            let received: HashSet<String> =
                migrations.iter().map(|m| m.host_dst.clone()).collect();
            let reward = config.policies.reward.reward(
                &migrations,
                &trial,
                config.weight_mem,
                config.weight_cpu,
            )?;
            plan.push(EvaluatedPlan::new(migrations, reward));
            working = trial;
            hosts_to_empty.retain(|h| h != &picked_name && !received.contains(h));
        } else {
            hosts_to_empty.retain(|h| h != &picked_name);
        }

        iterations += 1;
    }

    Ok(plan)
}

/// Attempts to place every VM of `host_name` elsewhere, simulating each
/// move so later VMs see updated occupancy. Returns `None` (discarding
/// the trial) unless every VM was placed.
pub(crate) fn try_evacuate(
    snapshot: &HostsInfo,
    host_name: &str,
    config: &DefraggerConfig,
) -> Result<(Option<Vec<VmMigration>>, HostsInfo)> {
    let mut trial = snapshot.clone();
    let vm_ids: Vec<u32> = trial.hosts[host_name].vms.iter().map(|v| v.id).collect();
    let mut migrations = Vec::with_capacity(vm_ids.len());

    for vm_id in vm_ids {
        let vm = trial.hosts[host_name].get_vm(vm_id).cloned().unwrap();
        let candidates: Vec<&Host> = trial
            .hosts
            .values()
            .filter(|h| h.hostname != host_name)
            .filter(|h| config.use_empty_as_destination || !h.vms.is_empty())
            .collect();

        let Some(dst) = config.policies.vm_scheduler.select(&vm, &candidates) else {
            return Ok((None, snapshot.clone()));
        };

        let mut m = VmMigration::new(vm.id, host_name, dst);
        m.cost = config.policies.cost.cost(&vm);
        trial.make_movement(&m)?;
        migrations.push(m);
    }

    if trial.hosts[host_name].vms.is_empty() {
        Ok((Some(migrations), trial))
    } else {
        Ok((None, snapshot.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::{HostSelectorPolicy, PolicySet, VmSchedulerPolicy};
    use crate::core::resource_model::Vm;

    fn cluster() -> HostsInfo {
        let mut hi = HostsInfo::new();
        let mut a = Host::new("a", 4.0, 8.0);
        a.add_vm(Vm::new(1, 1.0, 2.0, "a", 0));
        let mut b = Host::new("b", 4.0, 8.0);
        b.add_vm(Vm::new(2, 1.0, 2.0, "b", 0));
        b.add_vm(Vm::new(3, 1.0, 2.0, "b", 0));
        let c = Host::new("c", 4.0, 8.0);
        hi.insert_host(a);
        hi.insert_host(b);
        hi.insert_host(c);
        hi
    }

    fn config() -> DefraggerConfig {
        DefraggerConfig {
            policies: PolicySet {
                vm_scheduler: VmSchedulerPolicy::Packing,
                host_selector: HostSelectorPolicy::FirstFit,
                ..PolicySet::default()
            },
            stable_time: 0,
            ..DefraggerConfig::default()
        }
    }

    #[test]
    fn single_consolidation_moves_v1_into_b() {
        let hi = cluster();
        let plan = defrag(&hi, &[], &[], 1_000_000, &config()).unwrap();
        let migrations = plan.flatten();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].vm_id, 1);
        assert_eq!(migrations[0].host_src, "a");
        assert_eq!(migrations[0].host_dst, "b");
    }

    #[test]
    fn evacuation_or_nothing_when_destination_too_small() {
        let mut hi = HostsInfo::new();
        let mut a = Host::new("a", 4.0, 8.0);
        a.add_vm(Vm::new(1, 1.0, 2.0, "a", 0));
        let mut b = Host::new("b", 2.0, 4.0);
        b.add_vm(Vm::new(2, 1.5, 3.0, "b", 0));
        hi.insert_host(a);
        hi.insert_host(b);

        let plan = defrag(&hi, &["b".to_string()], &[], 1_000_000, &config()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn single_host_cluster_produces_empty_plan() {
        let mut hi = HostsInfo::new();
        hi.insert_host(Host::new("a", 4.0, 8.0));
        let plan = defrag(&hi, &[], &[], 0, &config()).unwrap();
        assert!(plan.is_empty());
    }
}
