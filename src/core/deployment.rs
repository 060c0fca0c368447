use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::common::VmMigration;
use crate::core::resource_model::HostsInfo;
use crate::error::Result;

/// The interface the core consumes from the hypervisor adapter. The real
/// adapter is out of scope; only this port is specified.
#[async_trait]
pub trait Deployment: Send + Sync {
    async fn get_info(&self) -> Result<Option<HostsInfo>>;
    async fn migrate_vm(&self, vm_id: u32, host_src: &str, host_dst: &str) -> Result<bool>;
    async fn migrating_vms(&self) -> Result<Vec<u32>>;
    /// Policy-locked or non-Running VMs the defragmenter must not touch.
    async fn locked_vms(&self) -> Result<Vec<u32>>;
}

#[derive(Debug, Default)]
struct FakeState {
    snapshot: Option<HostsInfo>,
    migrating: Vec<u32>,
    locked: Vec<u32>,
    refuse_migrations: bool,
    fail_get_info: bool,
}

/// An in-memory, scriptable `Deployment`. Not a second production
/// adapter — a harness for tests and a manual-testing CLI flag.
#[derive(Default)]
pub struct FakeDeployment {
    state: Mutex<FakeState>,
}

impl FakeDeployment {
    pub fn new(snapshot: HostsInfo) -> Self {
        Self {
            state: Mutex::new(FakeState {
                snapshot: Some(snapshot),
                ..FakeState::default()
            }),
        }
    }

    pub async fn set_snapshot(&self, snapshot: HostsInfo) {
        self.state.lock().await.snapshot = Some(snapshot);
    }

    pub async fn set_locked_vms(&self, ids: Vec<u32>) {
        self.state.lock().await.locked = ids;
    }

    pub async fn set_refuse_migrations(&self, refuse: bool) {
        self.state.lock().await.refuse_migrations = refuse;
    }

    pub async fn set_fail_get_info(&self, fail: bool) {
        self.state.lock().await.fail_get_info = fail;
    }

    pub async fn snapshot(&self) -> Option<HostsInfo> {
        self.state.lock().await.snapshot.clone()
    }
}

#[async_trait]
impl Deployment for FakeDeployment {
    async fn get_info(&self) -> Result<Option<HostsInfo>> {
        let state = self.state.lock().await;
        if state.fail_get_info {
            return Ok(None);
        }
        Ok(state.snapshot.clone())
    }

    async fn migrate_vm(&self, vm_id: u32, host_src: &str, host_dst: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.refuse_migrations {
            return Ok(false);
        }
        let m = VmMigration::new(vm_id, host_src, host_dst);
        if let Some(snapshot) = state.snapshot.as_mut() {
            snapshot.make_movement(&m)?;
        }
        state.migrating.push(vm_id);
        Ok(true)
    }

    async fn migrating_vms(&self) -> Result<Vec<u32>> {
        Ok(self.state.lock().await.migrating.clone())
    }

    async fn locked_vms(&self) -> Result<Vec<u32>> {
        Ok(self.state.lock().await.locked.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource_model::{Host, Vm};

    fn cluster() -> HostsInfo {
        let mut hi = HostsInfo::new();
        let mut a = Host::new("a", 4.0, 8.0);
        a.add_vm(Vm::new(1, 1.0, 2.0, "a", 0));
        hi.insert_host(a);
        hi.insert_host(Host::new("b", 4.0, 8.0));
        hi
    }

    #[tokio::test]
    async fn migrate_vm_applies_movement_to_snapshot() {
        let dep = FakeDeployment::new(cluster());
        let ok = dep.migrate_vm(1, "a", "b").await.unwrap();
        assert!(ok);
        let snap = dep.snapshot().await.unwrap();
        assert!(snap.hosts["b"].has_vm(1));
    }

    #[tokio::test]
    async fn refusing_migrations_returns_false() {
        let dep = FakeDeployment::new(cluster());
        dep.set_refuse_migrations(true).await;
        let ok = dep.migrate_vm(1, "a", "b").await.unwrap();
        assert!(!ok);
    }
}
