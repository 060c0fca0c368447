use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::resource_model::{Host, Vm};

/// Picks a destination host for a single VM from a candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmSchedulerPolicy {
    /// Candidates are tried in the given order; the first that fits wins.
    FirstFit,
    /// Prefers fuller hosts.
    Packing,
    /// Prefers emptier hosts.
    Stripping,
    /// Ranks by the host's advertised `FREE_CPU` metadata key.
    Load,
}

impl VmSchedulerPolicy {
    /// Returns the hostname of the highest-ranked candidate that can fit
    /// `vm`, or `None` if no candidate fits.
    pub fn select(&self, vm: &Vm, candidates: &[&Host]) -> Option<String> {
        let mut ranked: Vec<(f64, &Host)> = candidates
            .iter()
            .enumerate()
            .filter(|(_, h)| h.can_fit(vm))
            .map(|(position, h)| (self.rank(position, h), *h))
            .collect();

        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        ranked.first().map(|(_, h)| h.hostname.clone())
    }

    fn rank(&self, position: usize, host: &Host) -> f64 {
        match self {
            VmSchedulerPolicy::FirstFit => -(position as f64),
            VmSchedulerPolicy::Packing => host.vms.len() as f64,
            VmSchedulerPolicy::Stripping => -(host.vms.len() as f64),
            VmSchedulerPolicy::Load => match host
                .metadata
                .get("FREE_CPU")
                .and_then(|v| v.parse::<f64>().ok())
            {
                Some(v) => v,
                None => {
                    warn!(host = %host.hostname, "FREE_CPU metadata missing, assuming 0");
                    0.0
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str, cpu: f64, mem: f64) -> Host {
        Host::new(name, cpu, mem)
    }

    #[test]
    fn first_fit_picks_first_that_fits() {
        let a = host("a", 1.0, 1.0);
        let b = host("b", 4.0, 8.0);
        let vm = Vm::new(1, 2.0, 2.0, "elsewhere", 0);
        let dst = VmSchedulerPolicy::FirstFit.select(&vm, &[&a, &b]);
        assert_eq!(dst.as_deref(), Some("b"));
    }

    #[test]
    fn packing_prefers_fuller_host() {
        let mut a = host("a", 4.0, 8.0);
        a.add_vm(Vm::new(9, 1.0, 1.0, "a", 0));
        let b = host("b", 4.0, 8.0);
        let vm = Vm::new(1, 1.0, 1.0, "elsewhere", 0);
        let dst = VmSchedulerPolicy::Packing.select(&vm, &[&a, &b]);
        assert_eq!(dst.as_deref(), Some("a"));
    }

    #[test]
    fn no_candidate_fits_returns_none() {
        let a = host("a", 1.0, 1.0);
        let vm = Vm::new(1, 2.0, 2.0, "elsewhere", 0);
        assert_eq!(VmSchedulerPolicy::FirstFit.select(&vm, &[&a]), None);
    }
}
