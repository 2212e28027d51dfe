pub mod job;
pub mod queue;
pub mod runner;

pub use job::Job;
pub use queue::Queue;
pub use runner::Runner;
