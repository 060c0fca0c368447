use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::common::{EvaluatedPlan, MigrationPlanValue};
use crate::core::defrag::first_fit::try_evacuate;
use crate::core::defrag::{prepare, DefraggerConfig};
use crate::core::resource_model::HostsInfo;
use crate::error::Result;

/// The eight `BF_*`/`BFd_*` orderings Best-Fit can select a winning
/// evacuation candidate by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionVariant {
    LeastCost,
    GreatestCost,
    LeastReward,
    GreatestReward,
    LeastRewardPerCost,
    GreatestRewardPerCost,
    LeastCostPerReward,
    GreatestCostPerReward,
}

impl SelectionVariant {
    fn key(&self, plan: &EvaluatedPlan) -> f64 {
        match self {
            SelectionVariant::LeastCost | SelectionVariant::GreatestCost => plan.cost,
            SelectionVariant::LeastReward | SelectionVariant::GreatestReward => plan.reward,
            SelectionVariant::LeastRewardPerCost | SelectionVariant::GreatestRewardPerCost => {
                plan.reward_per_cost()
            }
            SelectionVariant::LeastCostPerReward | SelectionVariant::GreatestCostPerReward => {
                plan.cost_per_reward()
            }
        }
    }

    fn ascending(&self) -> bool {
        matches!(
            self,
            SelectionVariant::LeastCost
                | SelectionVariant::LeastReward
                | SelectionVariant::LeastRewardPerCost
                | SelectionVariant::LeastCostPerReward
        )
    }
}

/// Produces, over each outer iteration, an independent evacuation
/// candidate for every host still eligible to empty, then accepts the
/// single best one per `variant` and repeats.
pub fn defrag(
    snapshot: &HostsInfo,
    hosts_fixed: &[String],
    vms_fixed: &[u32],
    now: u64,
    config: &DefraggerConfig,
    variant: SelectionVariant,
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

        // Tie-break: preserve enumeration order of hosts_to_empty, since
        // only a strict `<`/`>` replaces the current best below.
        let mut best: Option<(EvaluatedPlan, HostsInfo, String)> = None;
        for host_name in hosts_to_empty.iter() {
            let (evacuated, trial) = try_evacuate(&working, host_name, config)?;
            let Some(migrations) = evacuated else {
                continue;
            };
            let reward = config.policies.reward.reward(
                &migrations,
                &trial,
                config.weight_mem,
                config.weight_cpu,
            )?;
            let candidate_plan = EvaluatedPlan::new(migrations, reward);
            let candidate_key = variant.key(&candidate_plan);

            best = Some(match best {
                None => (candidate_plan, trial, host_name.clone()),
                Some(current) => {
                    let current_key = variant.key(&current.0);
                    let candidate_wins = if variant.ascending() {
                        candidate_key < current_key
                    } else {
                        candidate_key > current_key
                    };
                    if candidate_wins {
                        (candidate_plan, trial, host_name.clone())
                    } else {
                        current
                    }
                }
            });
        }

        let Some((winner_plan, winner_snapshot, winner_host)) = best else {
            break;
        };

        let received: HashSet<String> = winner_plan
            .migrations
            .iter()
            .map(|m| m.host_dst.clone())
            .collect();
        working = winner_snapshot;
        plan.push(winner_plan);
        hosts_to_empty.retain(|h| h != &winner_host && !received.contains(h));

        iterations += 1;
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::{HostSelectorPolicy, PolicySet, RewardPolicy, VmSchedulerPolicy};
    use crate::core::resource_model::{Host, Vm};

    fn config() -> DefraggerConfig {
        DefraggerConfig {
            policies: PolicySet {
                vm_scheduler: VmSchedulerPolicy::Packing,
                host_selector: HostSelectorPolicy::FirstFit,
                reward: RewardPolicy::PlanLength,
                ..PolicySet::default()
            },
            stable_time: 0,
            ..DefraggerConfig::default()
        }
    }

    #[test]
    fn greatest_reward_picks_longer_evacuation_list() {
        // Evacuating X frees 1 VM into Z; evacuating Y frees 2 VMs into Z.
        let mut hi = HostsInfo::new();
        let mut x = Host::new("x", 4.0, 8.0);
        x.add_vm(Vm::new(1, 1.0, 1.0, "x", 0));
        let mut y = Host::new("y", 4.0, 8.0);
        y.add_vm(Vm::new(2, 1.0, 1.0, "y", 0));
        y.add_vm(Vm::new(3, 1.0, 1.0, "y", 0));
        let mut z = Host::new("z", 4.0, 8.0);
        z.add_vm(Vm::new(9, 0.0, 0.0, "z", 0));
        hi.insert_host(x);
        hi.insert_host(y);
        hi.insert_host(z);

        let plan = defrag(
            &hi,
            &[],
            &[],
            1_000_000,
            &config(),
            SelectionVariant::GreatestReward,
        )
        .unwrap();

        let first_iteration = &plan.iterations[0];
        assert_eq!(first_iteration.migrations.len(), 2);
        assert!(first_iteration
            .migrations
            .iter()
            .all(|m| m.host_src == "y"));
    }
}
