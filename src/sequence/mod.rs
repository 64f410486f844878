pub mod combo;
pub mod tracker;

pub use combo::{ComboResolver, ComboTrigger};
pub use tracker::{AcceptOutcome, SequenceProgress, SequenceTracker};
