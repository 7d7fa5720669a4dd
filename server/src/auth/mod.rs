pub mod handshake;
pub mod jwt;

pub use handshake::{authenticate, AuthFailure};
