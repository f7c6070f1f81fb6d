//! Canonical descriptor encoding.
//!
//! Lengths are lowercase hex with no leading zeros and count UTF-8 bytes,
//! not characters. The type byte is always written lowercase.

use std::io::Write;

use tracing::debug;

use crate::descriptor::Descriptor;
use crate::error::FormatResult;
use crate::TERMINATOR;

pub(crate) fn write_descriptor(descriptor: &Descriptor, writer: &mut impl Write) -> FormatResult<usize> {
    let mut written = write_text(writer, descriptor.object_name())?;

    writer.write_all(&[descriptor.descriptor_type().type_byte(), TERMINATOR])?;
    written += 2;

    written += write_text(writer, descriptor.name())?;

    debug!(bytes = written, kind = %descriptor.descriptor_type(), "descriptor encoded");
    Ok(written)
}

/// Write `<hex len> NUL <utf8 bytes> NUL`, returning the byte count.
fn write_text(writer: &mut impl Write, text: &str) -> FormatResult<usize> {
    let bytes = text.as_bytes();
    write!(writer, "{:x}", bytes.len())?;
    writer.write_all(&[TERMINATOR])?;
    writer.write_all(bytes)?;
    writer.write_all(&[TERMINATOR])?;
    Ok(text_len(text))
}

/// Encoded size of one length-prefixed text field.
pub(crate) fn text_len(text: &str) -> usize {
    let len = text.len();
    hex_width(len) + 1 + len + 1
}

fn hex_width(n: usize) -> usize {
    let bits = usize::BITS - n.leading_zeros();
    (bits.div_ceil(4) as usize).max(1)
}
