//! Wire protocol shared by the gateway and every client: frame shapes,
//! the connect handshake, and method-name constants.

pub mod frames;
pub mod handshake;
pub mod methods;
