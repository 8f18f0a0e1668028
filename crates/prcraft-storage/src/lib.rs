pub mod database;
pub mod repository;
pub mod schema;

pub use database::{Database, DatabaseError};
pub use repository::{TaskRepository, TaskStore};
