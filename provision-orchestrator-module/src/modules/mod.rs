//! Provider module implementations

/// Shared helpers used by module implementations.
pub mod common;

#[cfg(feature = "directadmin")]
mod directadmin;
#[cfg(feature = "namecheap")]
mod namecheap;

#[cfg(feature = "directadmin")]
pub use directadmin::DirectAdminModule;
#[cfg(feature = "namecheap")]
pub use namecheap::NamecheapModule;
