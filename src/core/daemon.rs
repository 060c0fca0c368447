use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::info;

use crate::config::{Config, PolicyConfig};
use crate::core::common::MigrationPlanValue;
use crate::core::defrag::{distribute_refill, first_fit, DefraggerConfig};
use crate::core::deployment::Deployment;
use crate::core::migration_plan::{MigrationPlan, MigrationPlanConfig};
use crate::core::monitor::Monitor;
use crate::core::resource_model::HostsInfo;
use crate::error::Result;

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Periodic defrag trigger plus the operator-facing commands the RPC
/// surface exposes. Wraps the migration plan executor behind a single
/// mutex; the Monitor has its own lock so a slow platform call never
/// blocks the defrag tick from observing cached state.
pub struct Daemon {
    pub monitor: Monitor,
    pub plan: Mutex<MigrationPlan>,
    deployment: Arc<dyn Deployment>,
    config: Config,
    defrag_config: DefraggerConfig,
}

impl Daemon {
    pub fn new(config: Config, deployment: Arc<dyn Deployment>) -> Self {
        let validity = std::time::Duration::from_secs(config.timing.monitorization_validity);
        let monitor = Monitor::new(deployment.clone(), validity);

        let plan_config = MigrationPlanConfig {
            cooldown_migration: config.timing.cooldown_migration,
            max_migration_time: config.timing.max_migration_time,
            max_simultaneous_migrations: config.concurrency.max_simultaneous_migrations,
            enable_migration: config.concurrency.enable_migration,
        };

        let defrag_config = DefraggerConfig {
            weight_mem: config.policy.weight_mem,
            weight_cpu: config.policy.weight_cpu,
            stable_time: if config.concurrency.consider_vms_stable_on_startup {
                0
            } else {
                config.timing.stable_time
            },
            disabled_hosts: config.policy.disabled_hosts.clone(),
            ..DefraggerConfig::default()
        };

        Self {
            monitor,
            plan: Mutex::new(MigrationPlan::new(plan_config)),
            deployment,
            config,
            defrag_config,
        }
    }

    /// Runs one defrag cycle unless a plan is already alive.
    pub async fn defrag_cycle(&self) -> Result<()> {
        let mut plan_guard = self.plan.lock().await;
        if plan_guard.is_alive() {
            info!("migration plan already running, skipping defrag cycle");
            return Ok(());
        }

        let snapshot = self.monitor.monitor().await?;
        let now = now_secs();

        let locked_hosts: Vec<String> = snapshot
            .hosts
            .values()
            .filter(|h| h.vms.len() as u32 > self.config.policy.max_migrations_per_host)
            .map(|h| h.hostname.clone())
            .collect();

        let mut fixed_vms = plan_guard.failed_vm_ids();
        fixed_vms.extend(self.deployment.locked_vms().await?);

        let mut planning_snapshot = snapshot.clone();
        apply_spare_capacity(&mut planning_snapshot, &self.config.policy);

        let computed = first_fit::defrag(
            &planning_snapshot,
            &locked_hosts,
            &fixed_vms,
            now,
            &self.defrag_config,
        )?;

        if !computed.is_empty() {
            info!(migrations = computed.flatten().len(), "starting migration plan");
            plan_guard.start(computed, snapshot);
        }
        Ok(())
    }

    /// Runs the "clean" defragmenter against exactly `hosts`, bypassing
    /// the stability gate for VMs already on those hosts, and replaces
    /// any currently running plan.
    pub async fn clean_hosts(&self, hosts: &[String], force: bool, use_empty: bool) -> Result<()> {
        let mut plan_guard = self.plan.lock().await;
        let mut snapshot = self.monitor.monitor().await?;
        let now = now_secs();

        snapshot.stabilize_vms(self.config.timing.stable_time, hosts);

        let hosts_fixed: Vec<String> = snapshot
            .hosts
            .keys()
            .filter(|h| !hosts.contains(h))
            .cloned()
            .collect();
        let fixed_vms: Vec<u32> = if force {
            Vec::new()
        } else {
            plan_guard.failed_vm_ids()
        };

        let mut config = self.defrag_config.clone();
        config.use_empty_as_destination = use_empty;

        plan_guard.cancel();
        let computed = first_fit::defrag(&snapshot, &hosts_fixed, &fixed_vms, now, &config)?;
        if !computed.is_empty() {
            plan_guard.start(computed, snapshot);
        }
        Ok(())
    }

    pub async fn forcerun(&self) -> Result<()> {
        self.defrag_cycle().await
    }

    pub async fn get_plan(&self) -> String {
        let plan_guard = self.plan.lock().await;
        format!(
            "pending migrations: {}, ongoing: {}, failed: {}",
            plan_guard.pending_plan().len(),
            plan_guard.ongoing().len(),
            plan_guard.failed_vm_ids().len(),
        )
    }

    pub async fn dump_data(&self) -> Result<String> {
        let snapshot = self.monitor.monitor().await?;
        let plan_guard = self.plan.lock().await;
        Ok(format!(
            "hosts: {}, vms: {}, empty hosts: {}, failed migrations: {:?}",
            snapshot.hosts.len(),
            snapshot.all_vms().len(),
            snapshot.empty_count(),
            plan_guard.failed_vm_ids(),
        ))
    }

    /// Runs the distribute-style defragmenter without installing its
    /// result as the active plan — used by the `getmean` RPC to preview
    /// a rebalance.
    pub async fn get_mean(&self, _override_running: bool) -> Result<MigrationPlanValue> {
        let snapshot = self.monitor.monitor().await?;
        let now = now_secs();
        distribute_refill::defrag_distribute(&snapshot, &[], &[], now, &self.defrag_config)
    }

    /// One tick of the migration plan executor; invoked by the periodic
    /// background loop in the binary entrypoint.
    pub async fn tick_plan(&self) -> Result<bool> {
        let mut plan_guard = self.plan.lock().await;
        let now = now_secs();
        plan_guard.tick(&self.monitor, now).await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn apply_spare_capacity(snapshot: &mut HostsInfo, policy: &PolicyConfig) {
    for host in snapshot.hosts.values_mut() {
        let spare_cpu = policy.spare_cpu + policy.spare_cpu_pct / 100.0 * host.cpu_total;
        let spare_memory = policy.spare_memory + policy.spare_memory_pct / 100.0 * host.memory_total;
        host.cpu_free = (host.cpu_free - spare_cpu).max(0.0);
        host.memory_free = (host.memory_free - spare_memory).max(0.0);
    }
}
