//! Range-aware media streaming.
//!
//! Serves objects from the backing store to players with HTTP range support:
//!
//! - [`range`] translates a `Range` header into a validated byte interval.
//! - [`relay`] opens the matching upstream read and frames the response.
//!
//! # Routes
//!
//! - `GET /stream/{object_id}` - Stream an object, honoring `Range`

pub mod range;
pub mod relay;

pub use range::{translate, RangeRequest};
pub use relay::{playback_content_type, RelayStream, StreamRelay};
