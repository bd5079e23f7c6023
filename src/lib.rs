//! Administrative console for the Kedil budgeting backend.
//!
//! [`context::AdminContext`] wires the pieces together: an authenticated
//! HTTP adapter, typed resource clients, a query cache with deduplication
//! and invalidation, and the hooks binding the two.

pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod session;
pub mod telemetry;

pub use context::AdminContext;
pub use error::ApiError;
