//! Bytecode decoding: the wire format, its decoded op representation, and
//! the decoder that turns one into the other.

pub mod code;
pub mod decoder;

pub use code::Code;
pub use decoder::{decode_file, DecodedFile};
