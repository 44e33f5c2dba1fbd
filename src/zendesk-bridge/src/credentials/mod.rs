//! Credential storage and per-invocation resolution.

mod resolver;
mod store;

pub use resolver::{
    AuthorizedClientHandle, CredentialResolver, Principal, Requirement, ResolveError,
};
pub use store::{CredentialStore, MemoryCredentialStore, StoredToken};
