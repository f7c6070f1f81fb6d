//! Descriptor record format for Portable VCS.
//!
//! A [`Descriptor`] names a file or folder and binds it to the object name of
//! its content. This crate owns the binary form of that record and nothing
//! else: computing object names, assembling descriptors into trees, and
//! moving bytes around are left to callers.
//!
//! # Wire Format
//!
//! ```text
//! <hex len> NUL <object name> NUL <type> NUL <hex len> NUL <name> NUL
//! ```
//!
//! - Lengths are ASCII hex digits giving a UTF-8 byte count. Decoding accepts
//!   either case; encoding writes lowercase with no leading zeros.
//! - A length of zero is invalid.
//! - The type byte is `b` for a file and `t` for a folder (`B`/`T` are
//!   accepted on decode).
//!
//! The format is unversioned and must be reproduced byte-for-byte.
//!
//! # Usage
//!
//! - [`Descriptor::read_from`] / [`Descriptor::write_to`] over any
//!   `std::io::Read` / `std::io::Write`
//! - [`DescriptorDecoder`] for decoding with a non-default [`DecodeConfig`]
//!
//! Decoding is synchronous and holds no shared state; independent streams
//! can be decoded on separate threads without coordination.

pub mod config;
pub mod decode;
pub mod descriptor;
pub mod encode;
pub mod error;

pub use config::DecodeConfig;
pub use decode::DescriptorDecoder;
pub use descriptor::{Descriptor, DescriptorType};
pub use error::{DecodeState, FormatError, FormatResult, MalformedReason, ParseTypeError};

/// The byte that ends every field.
pub const TERMINATOR: u8 = 0x00;
