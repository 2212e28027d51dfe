pub mod duration;
pub mod finalize;
pub mod handoff;

pub use duration::parse_duration;
pub use finalize::{Finalization, Finalizer};
pub use handoff::{JobReceiver, JobSender};
