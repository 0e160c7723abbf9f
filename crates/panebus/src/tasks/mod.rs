//! Task DAG: units of work with dependencies, assignable to sessions.

mod models;
mod repository;

pub use models::{CreateTask, Task, TaskPatch, TaskPriority, TaskStatus};
pub use repository::TaskRepository;
