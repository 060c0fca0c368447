use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::warn;

use crate::core::common::VmMigration;
use crate::core::deployment::Deployment;
use crate::core::resource_model::HostsInfo;
use crate::error::{CoreError, Result};

struct CachedSnapshot {
    snapshot: HostsInfo,
    fetched_at: Instant,
}

/// Owns the most recent snapshot and its acquisition timestamp, guarded
/// by a single lock shared across the daemon's ticks and the RPC surface.
pub struct Monitor {
    deployment: Arc<dyn Deployment>,
    validity: Duration,
    cached: Mutex<Option<CachedSnapshot>>,
}

impl Monitor {
    pub fn new(deployment: Arc<dyn Deployment>, validity: Duration) -> Self {
        Self {
            deployment,
            validity,
            cached: Mutex::new(None),
        }
    }

    /// Returns the cached snapshot if still within the validity window,
    /// otherwise refreshes via the deployment port. If refresh fails, the
    /// last known snapshot is served (with a warning) as a liveness
    /// fallback; only an empty cache turns a refresh failure into an error.
    pub async fn monitor(&self) -> Result<HostsInfo> {
        let mut cached = self.cached.lock().await;

        if let Some(c) = cached.as_ref() {
            if c.fetched_at.elapsed() < self.validity {
                return Ok(c.snapshot.clone());
            }
        }

        match self.deployment.get_info().await {
            Ok(Some(snapshot)) => {
                *cached = Some(CachedSnapshot {
                    snapshot: snapshot.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(snapshot)
            }
            Ok(None) => Self::serve_stale_or_fail(&cached),
            Err(e) => {
                warn!(error = %e, "deployment get_info failed");
                Self::serve_stale_or_fail(&cached)
            }
        }
    }

    fn serve_stale_or_fail(cached: &Option<CachedSnapshot>) -> Result<HostsInfo> {
        match cached {
            Some(c) => {
                warn!("deployment unavailable, serving stale cached snapshot");
                Ok(c.snapshot.clone())
            }
            None => Err(CoreError::DeploymentUnavailable(
                "get_info failed and no cache to fall back on".to_string(),
            )),
        }
    }

    /// Dispatches the migration via the deployment port and, on success,
    /// applies it to the cached snapshot so subsequent reads reflect the
    /// intent before the next poll.
    pub async fn make_migration(&self, m: &VmMigration) -> Result<bool> {
        let ok = self
            .deployment
            .migrate_vm(m.vm_id, &m.host_src, &m.host_dst)
            .await?;
        if ok {
            let mut cached = self.cached.lock().await;
            if let Some(c) = cached.as_mut() {
                c.snapshot.make_movement(m)?;
            }
        }
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::deployment::FakeDeployment;
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
    async fn monitor_caches_within_validity() {
        let dep = Arc::new(FakeDeployment::new(cluster()));
        let monitor = Monitor::new(dep.clone(), Duration::from_secs(60));
        let first = monitor.monitor().await.unwrap();
        dep.set_snapshot(HostsInfo::new()).await;
        let second = monitor.monitor().await.unwrap();
        assert_eq!(first.hosts.len(), second.hosts.len());
    }

    #[tokio::test]
    async fn make_migration_updates_cache_optimistically() {
        let dep = Arc::new(FakeDeployment::new(cluster()));
        let monitor = Monitor::new(dep, Duration::from_secs(60));
        monitor.monitor().await.unwrap();
        let m = VmMigration::new(1, "a", "b");
        let ok = monitor.make_migration(&m).await.unwrap();
        assert!(ok);
        let snap = monitor.monitor().await.unwrap();
        assert!(snap.hosts["b"].has_vm(1));
    }

    #[tokio::test]
    async fn serves_stale_cache_when_deployment_unavailable() {
        let dep = Arc::new(FakeDeployment::new(cluster()));
        let monitor = Monitor::new(dep.clone(), Duration::from_secs(0));
        monitor.monitor().await.unwrap();
        dep.set_fail_get_info(true).await;
        let result = monitor.monitor().await.unwrap();
        assert_eq!(result.hosts.len(), cluster().hosts.len());
    }

    #[tokio::test]
    async fn fails_when_deployment_unavailable_and_no_cache_yet() {
        let dep = Arc::new(FakeDeployment::new(cluster()));
        dep.set_fail_get_info(true).await;
        let monitor = Monitor::new(dep, Duration::from_secs(60));
        let result = monitor.monitor().await;
        assert!(result.is_err());
    }
}
