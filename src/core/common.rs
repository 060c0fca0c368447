use serde::{Deserialize, Serialize};

/// Lifecycle state of a VM as observed by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmState {
    Running,
    Other,
    Migrating,
}

/// A single proposed (or dispatched) VM move, produced by a defragmenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmMigration {
    pub vm_id: u32,
    pub host_src: String,
    pub host_dst: String,
    pub cost: f64,
    pub reward: f64,
}

impl VmMigration {
    pub fn new(vm_id: u32, host_src: impl Into<String>, host_dst: impl Into<String>) -> Self {
        Self {
            vm_id,
            host_src: host_src.into(),
            host_dst: host_dst.into(),
            cost: 0.0,
            reward: 0.0,
        }
    }

    /// The migration that would undo this one.
    pub fn inverse(&self) -> VmMigration {
        VmMigration {
            vm_id: self.vm_id,
            host_src: self.host_dst.clone(),
            host_dst: self.host_src.clone(),
            cost: self.cost,
            reward: self.reward,
        }
    }
}

/// One defragmenter iteration's worth of migrations, with its aggregate cost/reward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluatedPlan {
    pub migrations: Vec<VmMigration>,
    pub cost: f64,
    pub reward: f64,
}

impl EvaluatedPlan {
    /// `reward` is the list-level reward (e.g. post-simulation variance),
    /// not a sum of the individual migrations' `reward` fields — those
    /// default to 0 unless a future per-VM reward policy sets them.
    pub fn new(migrations: Vec<VmMigration>, reward: f64) -> Self {
        let cost = migrations.iter().map(|m| m.cost).sum();
        Self {
            migrations,
            cost,
            reward,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn reward_per_cost(&self) -> f64 {
        if self.cost == 0.0 {
            f64::INFINITY
        } else {
            self.reward / self.cost
        }
    }

    pub fn cost_per_reward(&self) -> f64 {
        if self.reward == 0.0 {
            f64::INFINITY
        } else {
            self.cost / self.reward
        }
    }
}

/// The full output of a defragmenter run: an ordered list of iterations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationPlanValue {
    pub iterations: Vec<EvaluatedPlan>,
}

impl MigrationPlanValue {
    pub fn is_empty(&self) -> bool {
        self.iterations.iter().all(EvaluatedPlan::is_empty)
    }

    pub fn push(&mut self, plan: EvaluatedPlan) {
        if !plan.is_empty() {
            self.iterations.push(plan);
        }
    }

    /// Flattens all iterations into a single front-to-back migration order.
    pub fn flatten(&self) -> Vec<VmMigration> {
        self.iterations
            .iter()
            .flat_map(|p| p.migrations.iter().cloned())
            .collect()
    }

    pub fn total_cost(&self) -> f64 {
        self.iterations.iter().map(|p| p.cost).sum()
    }

    pub fn total_reward(&self) -> f64 {
        self.iterations.iter().map(|p| p.reward).sum()
    }
}
