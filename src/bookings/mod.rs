pub mod cancellation;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod settlement;
pub mod status_machine;

pub use error::*;
pub use handlers::*;
pub use models::*;
pub use repository::*;
pub use scheduler::*;
pub use service::*;
pub use settlement::*;
pub use status_machine::*;
