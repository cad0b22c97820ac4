//! palaver-protocol – Zeilenprotokoll-Definitionen
//!
//! Dieses Crate definiert die Protokoll-Frames und den zeilenbasierten
//! Codec, die zwischen Client und Server ausgetauscht werden.

pub mod codec;
pub mod frame;

pub use codec::{ZeilenCodec, DEFAULT_MAX_ZEILENLAENGE};
pub use frame::{Frame, EXIT_SENTINEL};
