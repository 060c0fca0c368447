use crate::core::common::{EvaluatedPlan, MigrationPlanValue, VmMigration};
use crate::core::defrag::{prepare, DefraggerConfig};
use crate::core::resource_model::{HostsInfo, Vm};
use crate::error::Result;

fn vm_e(vm: &Vm, max_cpu: f64, max_memory: f64, weight_mem: f64, weight_cpu: f64) -> f64 {
    let norm_mem = if max_memory > 0.0 {
        vm.memory / max_memory
    } else {
        0.0
    };
    let norm_cpu = if max_cpu > 0.0 { vm.cpu / max_cpu } else { 0.0 };
    let denom = (weight_mem.powi(2) + weight_cpu.powi(2)).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    ((weight_mem * norm_mem).powi(2) + (weight_cpu * norm_cpu).powi(2)).sqrt() / denom
}

/// Positive when moving `signed_delta` of free-E onto `host` brings its
/// free-E closer to the cluster mean.
fn delta(current_free_e: f64, signed_delta: f64, r_mean: f64) -> f64 {
    (r_mean - current_free_e).abs() - (r_mean - (current_free_e + signed_delta)).abs()
}

fn r_mean(snapshot: &HostsInfo, weight_mem: f64, weight_cpu: f64) -> Result<f64> {
    let mut sum = 0.0;
    let mut n = 0usize;
    for hostname in snapshot.hosts.keys() {
        sum += snapshot.euclid_free(hostname, weight_mem, weight_cpu)?;
        n += 1;
    }
    Ok(if n > 0 { sum / n as f64 } else { 0.0 })
}

/// Iterates over movable VMs in ascending normalized-resource order,
/// moving each to the destination that most improves the cluster's
/// free-E balance, until no improving move remains.
pub fn defrag_distribute(
    snapshot: &HostsInfo,
    hosts_fixed: &[String],
    vms_fixed: &[u32],
    now: u64,
    config: &DefraggerConfig,
) -> Result<MigrationPlanValue> {
    let prepared = prepare(snapshot, hosts_fixed, vms_fixed, now, config)?;
    let mut working = prepared.snapshot;
    let movable_hosts = prepared.hosts_to_empty;
    let mut plan = MigrationPlanValue::default();
    let mut iterations = 0u32;

    loop {
        if let Some(max) = config.max_iterations {
            if iterations >= max {
                break;
            }
        }

        let mean = r_mean(&working, config.weight_mem, config.weight_cpu)?;
        let mut movable_vms: Vec<(u32, String, f64)> = movable_hosts
            .iter()
            .filter_map(|name| working.hosts.get(name))
            .flat_map(|h| h.vms.iter())
            .filter(|vm| !vms_fixed.contains(&vm.id))
            .map(|vm| {
                (
                    vm.id,
                    vm.hostname.clone(),
                    vm_e(vm, working.max_cpu, working.max_memory, config.weight_mem, config.weight_cpu),
                )
            })
            .collect();
        movable_vms.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut applied = false;
        for (vm_id, src, ve) in movable_vms {
            let src_free = working.euclid_free(&src, config.weight_mem, config.weight_cpu)?;
            if delta(src_free, ve, mean) < 0.0 {
                continue;
            }
            let vm = working.hosts[&src].get_vm(vm_id).cloned().unwrap();

            let mut best: Option<(String, f64)> = None;
            for (dst_name, dst_host) in &working.hosts {
                if dst_name == &src || !dst_host.can_fit(&vm) {
                    continue;
                }
                let dst_free = working.euclid_free(dst_name, config.weight_mem, config.weight_cpu)?;
                let improvement = delta(dst_free, -ve, mean);
                if improvement <= 0.0 {
                    continue;
                }
                let score = dst_free - improvement;
                let improves = match &best {
                    Some((_, s)) => score > *s,
                    None => true,
                };
                if improves {
                    best = Some((dst_name.clone(), score));
                }
            }

            if let Some((dst, _)) = best {
                let mut m = VmMigration::new(vm_id, src.clone(), dst.clone());
                m.cost = config.policies.cost.cost(&vm);
                working.make_movement(&m)?;
                let reward = config.policies.reward.reward(
                    std::slice::from_ref(&m),
                    &working,
                    config.weight_mem,
                    config.weight_cpu,
                )?;
                plan.push(EvaluatedPlan::new(vec![m], reward));
                applied = true;
                break;
            }
        }

        if !applied {
            break;
        }
        iterations += 1;
    }

    Ok(plan)
}

/// Outer loop over hosts in enumeration order, each trying to attract the
/// best-improving VM from elsewhere until no improving VM remains.
pub fn defrag_refill(
    snapshot: &HostsInfo,
    hosts_fixed: &[String],
    vms_fixed: &[u32],
    now: u64,
    config: &DefraggerConfig,
) -> Result<MigrationPlanValue> {
    let prepared = prepare(snapshot, hosts_fixed, vms_fixed, now, config)?;
    let mut working = prepared.snapshot;
    let host_order = prepared.hosts_to_empty;
    let mut plan = MigrationPlanValue::default();

    for host_name in &host_order {
        loop {
            let mean = r_mean(&working, config.weight_mem, config.weight_cpu)?;
            let dst_free = working.euclid_free(host_name, config.weight_mem, config.weight_cpu)?;

            let mut best: Option<(u32, String, f64)> = None;
            for (src_name, src_host) in &working.hosts {
                if src_name == host_name {
                    continue;
                }
                for vm in &src_host.vms {
                    if vms_fixed.contains(&vm.id) || !working.hosts[host_name].can_fit(vm) {
                        continue;
                    }
                    let ve = vm_e(vm, working.max_cpu, working.max_memory, config.weight_mem, config.weight_cpu);
                    let src_free = working.euclid_free(src_name, config.weight_mem, config.weight_cpu)?;
                    let delta_src = delta(src_free, ve, mean);
                    if delta_src < 0.0 {
                        continue;
                    }
                    let delta_dst = delta(dst_free, -ve, mean);
                    if delta_dst <= 0.0 {
                        continue;
                    }
                    let improvement = delta_src + delta_dst;
                    let improves = match &best {
                        Some((_, _, s)) => improvement > *s,
                        None => true,
                    };
                    if improves {
                        best = Some((vm.id, src_name.clone(), improvement));
                    }
                }
            }

            let Some((vm_id, src, _)) = best else {
                break;
            };
            let vm = working.hosts[&src].get_vm(vm_id).cloned().unwrap();
            let mut m = VmMigration::new(vm_id, src, host_name.clone());
            m.cost = config.policies.cost.cost(&vm);
            working.make_movement(&m)?;
            let reward = config.policies.reward.reward(
                std::slice::from_ref(&m),
                &working,
                config.weight_mem,
                config.weight_cpu,
            )?;
            plan.push(EvaluatedPlan::new(vec![m], reward));
        }
    }

    Ok(plan)
}
