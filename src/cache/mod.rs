//! Query/mutation cache layer.
//!
//! Inspired by TanStack Query. Views subscribe to keyed queries through
//! [`QueryClient::use_query`]; writes go through a [`Mutation`] whose success
//! invalidates the affected keys so every mounted view refetches.
//!
//! - Deduplicates concurrent fetches of the same key
//! - Applies results in issue order, never letting a slow old response
//!   clobber a newer one
//! - Tracks staleness and drops unused entries after a GC delay

mod client;
mod handle;
mod key;
mod mutation;
mod options;
mod state;

pub use client::QueryClient;
pub use handle::QueryHandle;
pub use key::{QueryFilter, QueryKey};
pub use mutation::{Mutation, MutationOptions};
pub use options::QueryOptions;
pub use state::{MutationStatus, QueryState, QueryStatus};
