pub mod codec;
pub mod messages;
pub mod types;

pub use codec::{decode, encode, CodecError};
pub use messages::*;
pub use types::*;
