//! Request middleware.
//!
//! - [`task_events::task_events`] -- publishes a task event after a handler
//!   reports that it ran a task.

pub mod task_events;

pub use task_events::{task_events, CurrentUser, TaskReport};
