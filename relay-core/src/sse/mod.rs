//! Server-Sent Events streaming mode.

mod scheduler;
mod writer;

pub use scheduler::SchedulerHandle;
pub use writer::{SseEvent, SseWriter};
pub(crate) use writer::WriteCommand;
