//! Concrete source provider implementations.

pub mod piped;

pub use piped::PipedProvider;
