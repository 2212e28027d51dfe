pub mod observability;
pub mod queues;
pub mod registry;
pub mod runners;
