//! Skip-file handling: which code the stepping engine steps over.
//!
//! - [`policy`]: the glob lists, overrides and node-internal rules of one target
//! - [`ranges`]: per-script blackboxed ranges for bundled sources
//! - [`propagator`]: keeps the runtime in sync with the policy
//! - [`bus`]: mirrors toggles between sessions of one debugging tree

pub mod bus;
pub mod debounce;
pub mod policy;
pub mod propagator;
pub mod ranges;

pub use bus::{SkipSyncBus, SkipSyncListener, SkipToggled, Subscription};
pub use debounce::Debouncer;
pub use policy::SkipPolicy;
pub use propagator::SkipPropagator;
pub use ranges::RangeUpdate;
