use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::common::{VmMigration, VmState};
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vm {
    pub id: u32,
    pub cpu: f64,
    pub memory: f64,
    pub hostname: String,
    pub state: VmState,
    pub timestamp_state: u64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Vm {
    pub fn new(id: u32, cpu: f64, memory: f64, hostname: impl Into<String>, now: u64) -> Self {
        Self {
            id,
            cpu,
            memory,
            hostname: hostname.into(),
            state: VmState::Running,
            timestamp_state: now,
            metadata: HashMap::new(),
        }
    }

    pub fn is_stable(&self, now: u64, stable_time: u64) -> bool {
        self.state == VmState::Running && now.saturating_sub(self.timestamp_state) >= stable_time
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub hostname: String,
    pub cpu_total: f64,
    pub cpu_free: f64,
    pub memory_total: f64,
    pub memory_free: f64,
    #[serde(default)]
    pub norm_cpu_free: f64,
    #[serde(default)]
    pub norm_cpu_total: f64,
    #[serde(default)]
    pub norm_memory_free: f64,
    #[serde(default)]
    pub norm_memory_total: f64,
    /// >= 0 is a cap on hosted VMs, -1 means unbounded.
    pub max_vms: i64,
    pub vms: Vec<Vm>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Host {
    pub fn new(hostname: impl Into<String>, cpu_total: f64, memory_total: f64) -> Self {
        Self {
            hostname: hostname.into(),
            cpu_total,
            cpu_free: cpu_total,
            memory_total,
            memory_free: memory_total,
            norm_cpu_free: 0.0,
            norm_cpu_total: 0.0,
            norm_memory_free: 0.0,
            norm_memory_total: 0.0,
            max_vms: -1,
            vms: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Appends `vm` and decrements free resources. Performs no capacity check.
    pub fn add_vm(&mut self, mut vm: Vm) {
        self.cpu_free -= vm.cpu;
        self.memory_free -= vm.memory;
        vm.hostname = self.hostname.clone();
        self.vms.push(vm);
    }

    pub fn remove_vm(&mut self, vm_id: u32) -> Option<Vm> {
        let pos = self.vms.iter().position(|v| v.id == vm_id)?;
        let vm = self.vms.remove(pos);
        self.cpu_free += vm.cpu;
        self.memory_free += vm.memory;
        Some(vm)
    }

    pub fn has_vm(&self, vm_id: u32) -> bool {
        self.vms.iter().any(|v| v.id == vm_id)
    }

    pub fn get_vm(&self, vm_id: u32) -> Option<&Vm> {
        self.vms.iter().find(|v| v.id == vm_id)
    }

    pub fn can_fit(&self, vm: &Vm) -> bool {
        self.cpu_free >= vm.cpu
            && self.memory_free >= vm.memory
            && (self.max_vms < 0 || (self.vms.len() as i64) < self.max_vms)
    }
}

fn euclid(m: f64, c: f64, weight_mem: f64, weight_cpu: f64) -> f64 {
    let denom = (weight_mem.powi(2) + weight_cpu.powi(2)).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    ((weight_mem * m).powi(2) + (weight_cpu * c).powi(2)).sqrt() / denom
}

/// A consistent view of every host and VM in the cluster at one instant.
///
/// Hosts are kept in a `BTreeMap` so that enumeration order is
/// deterministic across clones and runs; the defragmenters rely on a
/// stable iteration order for tie-breaking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostsInfo {
    pub hosts: BTreeMap<String, Host>,
    #[serde(default)]
    pub max_cpu: f64,
    #[serde(default)]
    pub max_memory: f64,
}

impl HostsInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_host(&mut self, host: Host) {
        self.hosts.insert(host.hostname.clone(), host);
    }

    /// Computes `max_cpu`/`max_memory` over the snapshot and fills each
    /// host's normalized fields. A single-host snapshot is defined as
    /// fully normalized (all fields 1.0); otherwise a zero total fails.
    pub fn normalize(&mut self) -> Result<()> {
        if self.hosts.is_empty() {
            return Ok(());
        }
        if self.hosts.len() == 1 {
            let host = self.hosts.values_mut().next().unwrap();
            self.max_cpu = host.cpu_total;
            self.max_memory = host.memory_total;
            host.norm_cpu_free = 1.0;
            host.norm_cpu_total = 1.0;
            host.norm_memory_free = 1.0;
            host.norm_memory_total = 1.0;
            return Ok(());
        }

        let max_cpu = self
            .hosts
            .values()
            .fold(0.0_f64, |acc, h| acc.max(h.cpu_total));
        let max_memory = self
            .hosts
            .values()
            .fold(0.0_f64, |acc, h| acc.max(h.memory_total));

        if max_cpu <= 0.0 {
            return Err(CoreError::CannotNormalize("cpu"));
        }
        if max_memory <= 0.0 {
            return Err(CoreError::CannotNormalize("memory"));
        }

        self.max_cpu = max_cpu;
        self.max_memory = max_memory;
        for host in self.hosts.values_mut() {
            host.norm_cpu_free = host.cpu_free / max_cpu;
            host.norm_cpu_total = host.cpu_total / max_cpu;
            host.norm_memory_free = host.memory_free / max_memory;
            host.norm_memory_total = host.memory_total / max_memory;
        }
        Ok(())
    }

    pub fn euclid_free(&self, hostname: &str, weight_mem: f64, weight_cpu: f64) -> Result<f64> {
        let host = self
            .hosts
            .get(hostname)
            .ok_or_else(|| CoreError::HostNotFound(hostname.to_string()))?;
        Ok(euclid(
            host.norm_memory_free,
            host.norm_cpu_free,
            weight_mem,
            weight_cpu,
        ))
    }

    pub fn euclid_total(&self, hostname: &str, weight_mem: f64, weight_cpu: f64) -> Result<f64> {
        let host = self
            .hosts
            .get(hostname)
            .ok_or_else(|| CoreError::HostNotFound(hostname.to_string()))?;
        Ok(euclid(
            host.norm_memory_total,
            host.norm_cpu_total,
            weight_mem,
            weight_cpu,
        ))
    }

    /// Moves the VM named by `m` from its source host to its destination,
    /// atomically, and incrementally refreshes the normalized fields of
    /// just the two hosts involved (`max_cpu`/`max_memory` are preserved).
    pub fn make_movement(&mut self, m: &VmMigration) -> Result<()> {
        let vm = {
            let src = self
                .hosts
                .get_mut(&m.host_src)
                .ok_or_else(|| CoreError::HostNotFound(m.host_src.clone()))?;
            src.remove_vm(m.vm_id)
                .ok_or(CoreError::VmNotFound(m.vm_id))?
        };

        if self.hosts.get(&m.host_dst).map(|h| h.has_vm(vm.id)) == Some(true) {
            return Err(CoreError::VmAlreadyPresent(vm.id, m.host_dst.clone()));
        }

        {
            let dst = self
                .hosts
                .get_mut(&m.host_dst)
                .ok_or_else(|| CoreError::HostNotFound(m.host_dst.clone()))?;
            dst.add_vm(vm);
        }

        let max_cpu = self.max_cpu;
        let max_memory = self.max_memory;
        for hostname in [&m.host_src, &m.host_dst] {
            if let Some(host) = self.hosts.get_mut(hostname) {
                if max_cpu > 0.0 {
                    host.norm_cpu_free = host.cpu_free / max_cpu;
                }
                if max_memory > 0.0 {
                    host.norm_memory_free = host.memory_free / max_memory;
                }
            }
        }
        Ok(())
    }

    /// Marks every VM on the named hosts Running and backdates
    /// `timestamp_state` by `delta_secs`, bypassing the stability gate.
    pub fn stabilize_vms(&mut self, delta_secs: u64, hostnames: &[String]) {
        for hostname in hostnames {
            if let Some(host) = self.hosts.get_mut(hostname) {
                for vm in host.vms.iter_mut() {
                    vm.state = VmState::Running;
                    vm.timestamp_state = vm.timestamp_state.saturating_sub(delta_secs);
                }
            }
        }
    }

    pub fn empty_count(&self) -> usize {
        self.hosts.values().filter(|h| h.vms.is_empty()).count()
    }

    pub fn all_vms(&self) -> Vec<&Vm> {
        self.hosts.values().flat_map(|h| h.vms.iter()).collect()
    }

    /// True iff both snapshots host the same set of VM ids on the same
    /// hosts, independent of per-host VM order.
    pub fn same_placement_as(&self, other: &HostsInfo) -> bool {
        if self.hosts.len() != other.hosts.len() {
            return false;
        }
        for (hostname, host) in &self.hosts {
            let Some(other_host) = other.hosts.get(hostname) else {
                return false;
            };
            let mut a: Vec<u32> = host.vms.iter().map(|v| v.id).collect();
            let mut b: Vec<u32> = other_host.vms.iter().map(|v| v.id).collect();
            a.sort_unstable();
            b.sort_unstable();
            if a != b {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str, cpu: f64, mem: f64) -> Host {
        Host::new(name, cpu, mem)
    }

    #[test]
    fn add_and_remove_vm_preserves_free_resources() {
        let mut h = host("a", 4.0, 8.0);
        h.add_vm(Vm::new(1, 1.0, 2.0, "a", 0));
        assert_eq!(h.cpu_free, 3.0);
        assert_eq!(h.memory_free, 6.0);
        let removed = h.remove_vm(1).unwrap();
        assert_eq!(removed.id, 1);
        assert_eq!(h.cpu_free, 4.0);
        assert_eq!(h.memory_free, 8.0);
    }

    #[test]
    fn can_fit_respects_max_vms() {
        let mut h = host("a", 4.0, 8.0);
        h.max_vms = 1;
        h.add_vm(Vm::new(1, 1.0, 1.0, "a", 0));
        let candidate = Vm::new(2, 1.0, 1.0, "a", 0);
        assert!(!h.can_fit(&candidate));
    }

    #[test]
    fn single_host_normalizes_to_one() {
        let mut hi = HostsInfo::new();
        hi.insert_host(host("a", 4.0, 8.0));
        hi.normalize().unwrap();
        let h = &hi.hosts["a"];
        assert_eq!(h.norm_cpu_total, 1.0);
        assert_eq!(h.norm_memory_total, 1.0);
    }

    #[test]
    fn zero_total_fails_to_normalize() {
        let mut hi = HostsInfo::new();
        hi.insert_host(host("a", 0.0, 8.0));
        hi.insert_host(host("b", 4.0, 8.0));
        let err = hi.normalize().unwrap_err();
        assert!(matches!(err, CoreError::CannotNormalize(_)));
    }

    #[test]
    fn make_movement_round_trips() {
        let mut hi = HostsInfo::new();
        let mut a = host("a", 4.0, 8.0);
        a.add_vm(Vm::new(1, 1.0, 2.0, "a", 0));
        hi.insert_host(a);
        hi.insert_host(host("b", 4.0, 8.0));
        hi.normalize().unwrap();

        let before = hi.clone();
        let m = VmMigration::new(1, "a", "b");
        hi.make_movement(&m).unwrap();
        assert!(hi.hosts["b"].has_vm(1));
        hi.make_movement(&m.inverse()).unwrap();
        assert!(hi.same_placement_as(&before));
        assert_eq!(hi.hosts["a"].cpu_free, before.hosts["a"].cpu_free);
    }

    #[test]
    fn stabilize_vms_backdates_timestamp() {
        let mut hi = HostsInfo::new();
        let mut a = host("a", 4.0, 8.0);
        let mut vm = Vm::new(1, 1.0, 1.0, "a", 1000);
        vm.state = VmState::Other;
        a.add_vm(vm);
        hi.insert_host(a);
        hi.stabilize_vms(600, &["a".to_string()]);
        let vm = hi.hosts["a"].get_vm(1).unwrap();
        assert_eq!(vm.state, VmState::Running);
        assert_eq!(vm.timestamp_state, 400);
    }
}
