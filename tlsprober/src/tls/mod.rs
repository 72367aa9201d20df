//! Wire format of the TLS record and handshake layers.

#[macro_use]
mod macros;

pub mod enums;
pub mod extensions;
pub mod handshake;
pub mod message;
pub mod suites;
