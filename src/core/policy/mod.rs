pub mod evaluation;
pub mod host_selector;
pub mod vm_scheduler;

pub use evaluation::{CostPolicy, RewardPolicy};
pub use host_selector::HostSelectorPolicy;
pub use vm_scheduler::VmSchedulerPolicy;

use serde::{Deserialize, Serialize};

/// The three orthogonal policy axes a defragmenter is configured with.
/// Composed by delegation: a `Defragger` holds one of these, never a
/// policy type hierarchy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PolicySet {
    pub vm_scheduler: VmSchedulerPolicy,
    pub host_selector: HostSelectorPolicy,
    pub cost: CostPolicy,
    pub reward: RewardPolicy,
}

impl Default for PolicySet {
    fn default() -> Self {
        Self {
            vm_scheduler: VmSchedulerPolicy::FirstFit,
            host_selector: HostSelectorPolicy::FirstFit,
            cost: CostPolicy::default(),
            reward: RewardPolicy::default(),
        }
    }
}
