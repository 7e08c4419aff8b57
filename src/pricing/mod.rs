pub mod availability;
pub mod cache;
pub mod discount_engine;
pub mod error;
pub mod fee_assembler;
pub mod handlers;
pub mod models;
pub mod price_calculator;
pub mod quote_builder;
pub mod rate_resolver;
pub mod repository;
pub mod service;

pub use availability::*;
pub use cache::*;
pub use discount_engine::*;
pub use error::*;
pub use fee_assembler::*;
pub use handlers::*;
pub use models::*;
pub use price_calculator::*;
pub use quote_builder::*;
pub use rate_resolver::*;
pub use repository::*;
pub use service::*;
