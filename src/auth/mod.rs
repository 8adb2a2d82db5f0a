//! Credential management for object-store access
//!
//! Credentials flow through the engine as immutable snapshots: each fetch
//! signs with the snapshot that was current when it was spawned, and the
//! cache refreshes the snapshot from a pluggable provider before it expires.

mod credentials;

pub use credentials::{
    AmbientProvider, CredentialCache, CredentialProvider, CredentialSnapshot, StaticProvider,
};
