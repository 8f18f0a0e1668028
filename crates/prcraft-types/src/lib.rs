pub mod message;
pub mod task;

pub use message::*;
pub use task::*;
