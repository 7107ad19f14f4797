//! Call-scoped context resolution.
//!
//! A call for a spec runs with the spec's isolated environment current on the
//! calling thread and a merged configuration computed fresh for the call.
//! Configuration the call changes is persisted into the spec so the same
//! call can be replayed elsewhere.

mod cancel;
mod manager;
pub mod scope;

pub use cancel::CancellationToken;
pub use manager::{CallContext, ContextManager};
pub use scope::{EnvironmentGuard, current_environment};
