pub mod overrides;
pub mod codec;
pub mod link;
pub mod recent;

pub use overrides::{apply, Override, OverrideMap, OverrideStore};
pub use codec::{decode, encode, MasterIndexLists};
pub use link::ShareLink;
pub use recent::{RecentPlan, RecentPlans};
