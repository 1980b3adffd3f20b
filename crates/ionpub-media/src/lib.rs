//! Media sources for the publisher
//!
//! The signaling core only needs a handle it can attach to the peer connection and stop on
//! shutdown; everything about where samples come from lives here.

pub mod codec;
pub mod track;

pub use codec::MediaCodec;
pub use track::{FileTrack, LocalTrack, MediaError};
