pub mod condition;
pub mod phase;
pub mod target;
pub mod view;

pub use condition::{Condition, condition_universe};
pub use phase::SessionPhase;
pub use target::{EdgeTracking, FormerTarget, Target};
pub use view::SessionView;
