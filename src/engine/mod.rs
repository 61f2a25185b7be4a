//! Pure computation engine: eligibility verdicts and reward allocation.

pub mod allocator;
pub mod eligibility;

pub use allocator::{AllocationError, RewardAllocator};
pub use eligibility::EligibilityEvaluator;
