pub mod backoff;
pub mod phase;

pub use backoff::{Backoff, MAX_BACKOFF, MIN_BACKOFF};
pub use phase::SessionPhase;
