pub mod engine;
pub mod states;

pub use engine::{WidgetLifecycle, WidgetTransitionError};
pub use states::{TransitionOutcome, WidgetEvent};
