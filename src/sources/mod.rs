//! Audio source resolution.
//!
//! - [`provider`] defines the [`SourceProvider`] trait and stream selection.
//! - [`resolver`] walks providers in priority order until one yields a source.
//! - [`instances`] keeps the rotating pool of provider endpoints.
//! - [`providers`] holds the concrete provider implementations.

pub mod instances;
pub mod provider;
pub mod providers;
pub mod resolver;

pub use instances::{InstancePool, ProviderInstance};
pub use provider::{select_audio_stream, AudioStream, ResolvedSource, SearchHit, SourceProvider};
pub use resolver::{ProviderDirectory, SourceResolver, StaticProviders};
