//! Protocol module containing the package type, identity schema, and the line codec.

pub mod codec;
pub mod identity;
pub mod package;

pub use codec::{decode, decode_datagram, encode, DecodeError, EncodeError};
pub use identity::{DeviceType, IdentityError, IdentityPackage};
pub use package::*;
