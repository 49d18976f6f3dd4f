//! Utils Module
pub mod truncate;
pub mod utf8;

pub use truncate::truncate_text;
pub use utf8::Utf8StreamDecoder;
