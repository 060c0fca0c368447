use std::collections::HashMap;

use crate::core::common::{MigrationPlanValue, VmMigration};
use crate::core::monitor::Monitor;
use crate::core::resource_model::{HostsInfo, VmState};
use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct OngoingMigration {
    pub timestamp_start: u64,
    pub host_src: String,
    pub host_dst: String,
}

#[derive(Debug, Clone)]
pub struct MigrationPlanConfig {
    pub cooldown_migration: u64,
    pub max_migration_time: u64,
    pub max_simultaneous_migrations: u32,
    pub enable_migration: bool,
}

/// Stateful execution supervisor: drives a pending plan one migration at
/// a time, watches for drift against its baseline snapshot, and retires
/// migrations on confirmation or timeout.
pub struct MigrationPlan {
    config: MigrationPlanConfig,
    pending: Vec<VmMigration>,
    ongoing: HashMap<u32, OngoingMigration>,
    failed: HashMap<u32, OngoingMigration>,
    last_dispatch_ts: u64,
    baseline: Option<HostsInfo>,
}

impl MigrationPlan {
    pub fn new(config: MigrationPlanConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            ongoing: HashMap::new(),
            failed: HashMap::new(),
            last_dispatch_ts: 0,
            baseline: None,
        }
    }

    pub fn start(&mut self, plan: MigrationPlanValue, baseline: HostsInfo) {
        self.pending = plan.flatten();
        self.baseline = Some(baseline);
    }

    pub fn cancel(&mut self) {
        self.pending.clear();
        self.baseline = None;
    }

    pub fn is_alive(&self) -> bool {
        !self.pending.is_empty() || !self.ongoing.is_empty()
    }

    pub fn pending_plan(&self) -> &[VmMigration] {
        &self.pending
    }

    pub fn ongoing(&self) -> &HashMap<u32, OngoingMigration> {
        &self.ongoing
    }

    pub fn failed_vm_ids(&self) -> Vec<u32> {
        self.failed.keys().copied().collect()
    }

    /// Polls drift/timeout state against `fresh`. Returns `false` (and
    /// cancels the plan) if a failed migration is found or drift is
    /// detected; `true` if the plan should keep running.
    pub fn update(&mut self, now: u64, fresh: &HostsInfo) -> bool {
        let mut completed = Vec::new();
        let mut timed_out = Vec::new();
        for (vm_id, ongoing) in &self.ongoing {
            if is_confirmed(fresh, *vm_id, &ongoing.host_dst) {
                completed.push(*vm_id);
                continue;
            }
            if now.saturating_sub(ongoing.timestamp_start) > self.config.max_migration_time {
                timed_out.push(*vm_id);
            }
        }
        for vm_id in completed {
            self.ongoing.remove(&vm_id);
        }
        for vm_id in timed_out {
            if let Some(o) = self.ongoing.remove(&vm_id) {
                self.failed.insert(vm_id, o);
            }
        }
        if !self.failed.is_empty() {
            self.cancel();
            return false;
        }

        if let Some(baseline) = &self.baseline {
            if detect_drift(baseline, fresh, &self.ongoing) {
                self.cancel();
                return false;
            }
        }
        true
    }

    /// One executor tick. Returns `Ok(true)` if there is more work left
    /// to do (the caller should reschedule another tick).
    pub async fn tick(&mut self, monitor: &Monitor, now: u64) -> Result<bool> {
        if now.saturating_sub(self.last_dispatch_ts) < self.config.cooldown_migration {
            return Ok(self.is_alive());
        }
        if !self.config.enable_migration {
            self.cancel();
            return Ok(false);
        }

        let fresh = match monitor.monitor().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "monitor unavailable, retrying next tick");
                return Ok(self.is_alive());
            }
        };
        if !self.update(now, &fresh) {
            return Ok(false);
        }

        if self.ongoing.len() as u32 >= self.config.max_simultaneous_migrations {
            return Ok(true);
        }
        if self.config.max_simultaneous_migrations > 1 {
            return Err(CoreError::UnsupportedConcurrency(
                self.config.max_simultaneous_migrations,
            ));
        }

        let Some(next) = self.pending.first().cloned() else {
            return Ok(self.is_alive());
        };

        match monitor.make_migration(&next).await {
            Ok(true) => {
                self.pending.remove(0);
                self.ongoing.insert(
                    next.vm_id,
                    OngoingMigration {
                        timestamp_start: now,
                        host_src: next.host_src.clone(),
                        host_dst: next.host_dst.clone(),
                    },
                );
                self.last_dispatch_ts = now;
                Ok(self.is_alive())
            }
            Ok(false) => {
                self.record_failure_and_cancel(next, now);
                Ok(false)
            }
            Err(e) => {
                self.record_failure_and_cancel(next, now);
                Err(e)
            }
        }
    }

    fn record_failure_and_cancel(&mut self, migration: VmMigration, now: u64) {
        self.failed.insert(
            migration.vm_id,
            OngoingMigration {
                timestamp_start: now,
                host_src: migration.host_src,
                host_dst: migration.host_dst,
            },
        );
        self.cancel();
    }
}

fn is_confirmed(fresh: &HostsInfo, vm_id: u32, host_dst: &str) -> bool {
    fresh
        .hosts
        .get(host_dst)
        .and_then(|h| h.get_vm(vm_id))
        .is_some_and(|vm| vm.state == VmState::Running)
}

/// Any non-ongoing VM whose host in `fresh` differs from its host in
/// `baseline` (including having vanished) counts as drift.
fn detect_drift(
    baseline: &HostsInfo,
    fresh: &HostsInfo,
    ongoing: &HashMap<u32, OngoingMigration>,
) -> bool {
    for vm in baseline.all_vms() {
        if ongoing.contains_key(&vm.id) {
            continue;
        }
        match fresh.hosts.get(&vm.hostname).and_then(|h| h.get_vm(vm.id)) {
            Some(_) => {}
            None => return true,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::EvaluatedPlan;
    use crate::core::resource_model::{Host, Vm};

    fn config() -> MigrationPlanConfig {
        MigrationPlanConfig {
            cooldown_migration: 0,
            max_migration_time: 100,
            max_simultaneous_migrations: 1,
            enable_migration: true,
        }
    }

    fn cluster() -> HostsInfo {
        let mut hi = HostsInfo::new();
        let mut a = Host::new("a", 4.0, 8.0);
        a.add_vm(Vm::new(1, 1.0, 2.0, "a", 0));
        let mut c = Host::new("c", 4.0, 8.0);
        c.add_vm(Vm::new(2, 1.0, 2.0, "c", 0));
        hi.insert_host(a);
        hi.insert_host(Host::new("b", 4.0, 8.0));
        hi.insert_host(c);
        hi
    }

    #[test]
    fn drift_cancels_plan() {
        let mut plan = MigrationPlan::new(config());
        let baseline = cluster();
        let mut mpv = MigrationPlanValue::default();
        mpv.push(EvaluatedPlan::new(vec![VmMigration::new(1, "a", "b")], 0.0));
        plan.start(mpv, baseline.clone());

        let mut fresh = baseline;
        // v2 moves C -> A, which is not tracked in `ongoing`.
        let m = VmMigration::new(2, "c", "a");
        fresh.make_movement(&m).unwrap();

        let alive = plan.update(10, &fresh);
        assert!(!alive);
        assert!(plan.pending_plan().is_empty());
        assert!(plan.ongoing().is_empty());
    }

    #[test]
    fn timeout_moves_migration_to_failed() {
        let mut plan = MigrationPlan::new(config());
        plan.ongoing.insert(
            1,
            OngoingMigration {
                timestamp_start: 0,
                host_src: "a".to_string(),
                host_dst: "b".to_string(),
            },
        );
        let fresh = cluster();
        let alive = plan.update(1_000, &fresh);
        assert!(!alive);
        assert!(plan.failed_vm_ids().contains(&1));
    }
}
