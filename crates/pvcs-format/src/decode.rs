//! Single-pass descriptor decoding.
//!
//! The decoder walks five stages in order, carrying the fields decoded so
//! far in the stage value itself:
//!
//! ```text
//! ObjectNameLength -> ObjectName -> Type -> NameLength -> Name -> Descriptor
//! ```
//!
//! Any violated rule ends the walk with [`FormatError::Malformed`] naming the
//! stage it happened in. Nothing is returned until every stage has passed.

use std::io::{self, Read};

use tracing::{debug, trace, warn};

use crate::config::DecodeConfig;
use crate::descriptor::{Descriptor, DescriptorType};
use crate::error::{DecodeState, FormatError, FormatResult, MalformedReason};
use crate::TERMINATOR;

/// Cap on the up-front buffer reservation for a text field. Larger declared
/// lengths grow the buffer as bytes actually arrive.
const PREALLOC_LIMIT: usize = 64 * 1024;

/// Decode progress, holding everything decoded so far.
enum Stage {
    ObjectNameLength,
    ObjectName {
        len: usize,
    },
    Type {
        object_name: String,
    },
    NameLength {
        object_name: String,
        descriptor_type: DescriptorType,
    },
    Name {
        object_name: String,
        descriptor_type: DescriptorType,
        len: usize,
    },
}

impl Stage {
    fn state(&self) -> DecodeState {
        match self {
            Self::ObjectNameLength => DecodeState::ObjectNameLength,
            Self::ObjectName { .. } => DecodeState::ObjectName,
            Self::Type { .. } => DecodeState::Type,
            Self::NameLength { .. } => DecodeState::NameLength,
            Self::Name { .. } => DecodeState::Name,
        }
    }
}

/// Tracks how many bytes a decode pulled from the channel.
struct CountingReader<'a, R> {
    inner: &'a mut R,
    count: usize,
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n;
        Ok(n)
    }
}

/// Reads descriptors from byte streams.
///
/// The decoder holds only its configuration, so one instance can be shared
/// across threads and used on any number of independent streams.
#[derive(Clone, Debug, Default)]
pub struct DescriptorDecoder {
    config: DecodeConfig,
}

impl DescriptorDecoder {
    pub fn new(config: DecodeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Decode exactly one descriptor from `reader`.
    ///
    /// Bytes after the final terminator are left unread. On error the
    /// reader's position is unspecified and it should not be reused for
    /// another decode without repositioning.
    pub fn decode(&self, reader: &mut impl Read) -> FormatResult<Descriptor> {
        self.decode_counted(reader).map(|(descriptor, _)| descriptor)
    }

    /// Like [`decode`](Self::decode), also returning the number of bytes
    /// consumed. This can differ from [`Descriptor::encoded_len`] when the
    /// input has leading zeros in a length or was decoded lossily.
    pub fn decode_counted(&self, reader: &mut impl Read) -> FormatResult<(Descriptor, usize)> {
        let mut counted = CountingReader {
            inner: reader,
            count: 0,
        };
        let result = self.run(&mut counted);
        match &result {
            Ok(descriptor) => debug!(
                bytes = counted.count,
                kind = %descriptor.descriptor_type(),
                "descriptor decoded"
            ),
            Err(FormatError::Malformed { state, reason }) => {
                warn!(%state, %reason, bytes = counted.count, "rejected malformed descriptor")
            }
            Err(_) => {}
        }
        result.map(|descriptor| (descriptor, counted.count))
    }

    /// Decode one descriptor from the front of `data`.
    pub fn decode_bytes(&self, data: &[u8]) -> FormatResult<Descriptor> {
        let mut cursor = data;
        self.decode(&mut cursor)
    }

    fn run(&self, reader: &mut impl Read) -> FormatResult<Descriptor> {
        let mut stage = Stage::ObjectNameLength;
        loop {
            let at = stage.state();
            stage = match stage {
                Stage::ObjectNameLength => Stage::ObjectName {
                    len: self.read_length(reader, at)?,
                },
                Stage::ObjectName { len } => Stage::Type {
                    object_name: self.read_text(reader, len, at)?,
                },
                Stage::Type { object_name } => Stage::NameLength {
                    object_name,
                    descriptor_type: read_type(reader, at)?,
                },
                Stage::NameLength {
                    object_name,
                    descriptor_type,
                } => Stage::Name {
                    object_name,
                    descriptor_type,
                    len: self.read_length(reader, at)?,
                },
                Stage::Name {
                    object_name,
                    descriptor_type,
                    len,
                } => {
                    let name = self.read_text(reader, len, at)?;
                    return Descriptor::new(object_name, descriptor_type, name);
                }
            };
        }
    }

    /// Read hex digits up to the terminator and return the byte count.
    fn read_length(&self, reader: &mut impl Read, at: DecodeState) -> FormatResult<usize> {
        let mut len: usize = 0;
        loop {
            let byte = next_byte(reader, at)?;
            if byte == TERMINATOR {
                break;
            }
            let digit = (byte as char)
                .to_digit(16)
                .ok_or_else(|| FormatError::malformed(at, MalformedReason::NonHexDigit { byte }))?;
            len = len
                .checked_mul(16)
                .and_then(|v| v.checked_add(digit as usize))
                .ok_or_else(|| FormatError::malformed(at, MalformedReason::LengthOverflow))?;
        }

        if len == 0 {
            return Err(FormatError::malformed(at, MalformedReason::ZeroLength));
        }
        if let Some(max) = self.config.max_field_len {
            if len > max {
                return Err(FormatError::malformed(
                    at,
                    MalformedReason::FieldTooLong { length: len, max },
                ));
            }
        }
        trace!(state = %at, len, "length read");
        Ok(len)
    }

    /// Read exactly `len` bytes of text followed by the terminator.
    fn read_text(&self, reader: &mut impl Read, len: usize, at: DecodeState) -> FormatResult<String> {
        let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        read_up_to(reader, len, &mut buf)?;
        if buf.len() < len {
            return Err(FormatError::malformed(at, MalformedReason::UnexpectedEof));
        }
        expect_terminator(reader, at)?;

        let text = if self.config.strict_utf8 {
            String::from_utf8(buf)
                .map_err(|_| FormatError::malformed(at, MalformedReason::InvalidUtf8))?
        } else {
            String::from_utf8_lossy(&buf).into_owned()
        };
        trace!(state = %at, len, "text read");
        Ok(text)
    }
}

/// Read the type byte and its terminator.
///
/// The terminator is checked before the type byte is interpreted, so a
/// missing terminator is reported even when the type byte is also bad.
fn read_type(reader: &mut impl Read, at: DecodeState) -> FormatResult<DescriptorType> {
    let byte = next_byte(reader, at)?;
    expect_terminator(reader, at)?;
    let descriptor_type = DescriptorType::from_type_byte(byte)
        .ok_or_else(|| FormatError::malformed(at, MalformedReason::UnknownType { byte }))?;
    trace!(state = %at, kind = %descriptor_type, "type read");
    Ok(descriptor_type)
}

fn expect_terminator(reader: &mut impl Read, at: DecodeState) -> FormatResult<()> {
    match next_byte(reader, at)? {
        TERMINATOR => Ok(()),
        found => Err(FormatError::malformed(
            at,
            MalformedReason::ExpectedTerminator { found },
        )),
    }
}

/// Read a single byte, mapping end of input to a malformed error.
fn next_byte(reader: &mut impl Read, at: DecodeState) -> FormatResult<u8> {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Err(FormatError::malformed(at, MalformedReason::UnexpectedEof)),
            Ok(_) => return Ok(buf[0]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(FormatError::malformed(at, MalformedReason::UnexpectedEof))
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Append at most `len` bytes to `buf`, stopping early only at end of input.
fn read_up_to(reader: &mut impl Read, len: usize, buf: &mut Vec<u8>) -> io::Result<()> {
    match reader.by_ref().take(len as u64).read_to_end(buf) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const OBJECT: &str = "e82fe33199f25c242213ada825358e91c4261753";

    fn decode(bytes: &[u8]) -> FormatResult<Descriptor> {
        Descriptor::from_bytes(bytes)
    }

    fn assert_malformed(bytes: &[u8], state: DecodeState, reason: MalformedReason) {
        let err = decode(bytes).unwrap_err();
        assert_eq!(
            err.malformed_at(),
            Some((state, reason)),
            "input {:?} gave {err}",
            String::from_utf8_lossy(bytes)
        );
    }

    #[test]
    fn empty_input_is_eof() {
        assert_malformed(b"", DecodeState::ObjectNameLength, MalformedReason::UnexpectedEof);
    }

    #[test]
    fn valid_folder_descriptor() {
        let bytes = format!("28\0{OBJECT}\0t\03\0foo\0");
        let d = decode(bytes.as_bytes()).unwrap();
        assert_eq!(d, Descriptor::new(OBJECT, DescriptorType::Folder, "foo").unwrap());
    }

    #[test]
    fn valid_file_descriptor() {
        let bytes = format!("28\0{OBJECT}\0b\03\0foo\0");
        let d = decode(bytes.as_bytes()).unwrap();
        assert_eq!(d, Descriptor::new(OBJECT, DescriptorType::File, "foo").unwrap());
    }

    #[test]
    fn uppercase_type_and_length_digits_accepted() {
        let bytes = format!("28\0{OBJECT}\0T\03\0foo\0");
        assert!(decode(bytes.as_bytes()).unwrap().is_folder());

        let bytes = format!("28\0{OBJECT}\0B\03\0foo\0");
        assert!(decode(bytes.as_bytes()).unwrap().is_file());

        let name = "n".repeat(0xab);
        let bytes = format!("28\0{OBJECT}\0b\0AB\0{name}\0");
        assert_eq!(decode(bytes.as_bytes()).unwrap().name(), name);
    }

    #[test]
    fn leading_zero_digits_accepted() {
        let bytes = format!("0028\0{OBJECT}\0b\003\0foo\0");
        assert_eq!(decode(bytes.as_bytes()).unwrap().name(), "foo");
    }

    #[test]
    fn invalid_type_byte() {
        let bytes = format!("28\0{OBJECT}\0q\03\0foo\0");
        assert_malformed(
            bytes.as_bytes(),
            DecodeState::Type,
            MalformedReason::UnknownType { byte: b'q' },
        );
    }

    #[test]
    fn non_hex_length() {
        let bytes = format!("zz\0{OBJECT}\0b\03\0foo\0");
        assert_malformed(
            bytes.as_bytes(),
            DecodeState::ObjectNameLength,
            MalformedReason::NonHexDigit { byte: b'z' },
        );
    }

    #[test]
    fn non_hex_name_length() {
        let bytes = format!("28\0{OBJECT}\0b\0g\0foo\0");
        assert_malformed(
            bytes.as_bytes(),
            DecodeState::NameLength,
            MalformedReason::NonHexDigit { byte: b'g' },
        );
    }

    #[test]
    fn zero_length_object_name() {
        assert_malformed(
            b"0\0\0t\x003\0foo\0",
            DecodeState::ObjectNameLength,
            MalformedReason::ZeroLength,
        );
    }

    #[test]
    fn empty_digit_run_is_zero_length() {
        assert_malformed(
            b"\0\0t\x003\0foo\0",
            DecodeState::ObjectNameLength,
            MalformedReason::ZeroLength,
        );
        let bytes = format!("28\0{OBJECT}\0t\0\0\0");
        assert_malformed(bytes.as_bytes(), DecodeState::NameLength, MalformedReason::ZeroLength);
    }

    #[test]
    fn overlong_length_overflows() {
        let digits = "f".repeat(usize::BITS as usize / 4 + 1);
        let bytes = format!("{digits}\0abc\0");
        assert_malformed(
            bytes.as_bytes(),
            DecodeState::ObjectNameLength,
            MalformedReason::LengthOverflow,
        );
    }

    #[test]
    fn huge_declared_length_with_short_input_is_eof() {
        let bytes = b"ffffffff\0abc";
        assert_malformed(bytes, DecodeState::ObjectName, MalformedReason::UnexpectedEof);
    }

    #[test]
    fn truncation_matrix() {
        let cases: &[(&str, DecodeState)] = &[
            ("2", DecodeState::ObjectNameLength),
            ("28", DecodeState::ObjectNameLength),
            ("28\0e82fe33199f25c242213ada825358e91c426175", DecodeState::ObjectName),
            ("28\0e82fe33199f25c242213ada825358e91c4261753", DecodeState::ObjectName),
            ("28\0e82fe33199f25c242213ada825358e91c4261753\0", DecodeState::Type),
            ("28\0e82fe33199f25c242213ada825358e91c4261753\0b", DecodeState::Type),
            ("28\0e82fe33199f25c242213ada825358e91c4261753\0b\0", DecodeState::NameLength),
            ("28\0e82fe33199f25c242213ada825358e91c4261753\0b\x003", DecodeState::NameLength),
            ("28\0e82fe33199f25c242213ada825358e91c4261753\0b\x003\0", DecodeState::Name),
            ("28\0e82fe33199f25c242213ada825358e91c4261753\0b\x003\0fo", DecodeState::Name),
            ("28\0e82fe33199f25c242213ada825358e91c4261753\0b\x003\0foo", DecodeState::Name),
        ];
        for (input, state) in cases {
            assert_malformed(input.as_bytes(), *state, MalformedReason::UnexpectedEof);
        }
    }

    #[test]
    fn every_strict_prefix_fails() {
        let full = Descriptor::new(OBJECT, DescriptorType::File, "foo").unwrap().to_bytes();
        for cut in 0..full.len() {
            let err = decode(&full[..cut]).unwrap_err();
            assert_eq!(err.malformed_reason(), Some(MalformedReason::UnexpectedEof), "cut at {cut}");
        }
        assert!(decode(&full).is_ok());
    }

    #[test]
    fn wrong_terminator_at_each_position() {
        let cases: &[(&str, DecodeState, MalformedReason)] = &[
            (
                "28\x01e82fe33199f25c242213ada825358e91c4261753\0b\x003\0foo\0",
                DecodeState::ObjectNameLength,
                MalformedReason::NonHexDigit { byte: 0x01 },
            ),
            (
                "28\0e82fe33199f25c242213ada825358e91c4261753\x01b\x003\0foo\0",
                DecodeState::ObjectName,
                MalformedReason::ExpectedTerminator { found: 0x01 },
            ),
            (
                "28\0e82fe33199f25c242213ada825358e91c4261753\0b\x013\0foo\0",
                DecodeState::Type,
                MalformedReason::ExpectedTerminator { found: 0x01 },
            ),
            (
                "28\0e82fe33199f25c242213ada825358e91c4261753\0b\x003\x01foo\0",
                DecodeState::NameLength,
                MalformedReason::NonHexDigit { byte: 0x01 },
            ),
            (
                "28\0e82fe33199f25c242213ada825358e91c4261753\0b\x003\0foo\x01",
                DecodeState::Name,
                MalformedReason::ExpectedTerminator { found: 0x01 },
            ),
        ];
        for (input, state, reason) in cases {
            assert_malformed(input.as_bytes(), *state, *reason);
        }
    }

    #[test]
    fn invalid_utf8_rejected_when_strict() {
        let bytes = b"2\0\xff\xfe\0b\x003\0foo\0";
        assert_malformed(bytes, DecodeState::ObjectName, MalformedReason::InvalidUtf8);
    }

    #[test]
    fn invalid_utf8_in_name_rejected() {
        let mut bytes = format!("28\0{OBJECT}\0b\x003\0").into_bytes();
        bytes.extend_from_slice(b"f\xc3\x28\0");
        assert_malformed(&bytes, DecodeState::Name, MalformedReason::InvalidUtf8);
    }

    #[test]
    fn invalid_utf8_replaced_when_lossy() {
        let decoder = DescriptorDecoder::new(DecodeConfig::lossy());
        let d = decoder.decode_bytes(b"2\0\xff\xfe\0b\x003\0foo\0").unwrap();
        assert_eq!(d.object_name(), "\u{fffd}\u{fffd}");
    }

    #[test]
    fn max_field_len_enforced() {
        let decoder = DescriptorDecoder::new(DecodeConfig::with_max_field_len(8));
        let bytes = format!("28\0{OBJECT}\0b\03\0foo\0");
        let err = decoder.decode_bytes(bytes.as_bytes()).unwrap_err();
        assert_eq!(
            err.malformed_at(),
            Some((
                DecodeState::ObjectNameLength,
                MalformedReason::FieldTooLong { length: 0x28, max: 8 }
            ))
        );

        assert!(decoder.decode_bytes(b"8\0abcdefgh\0t\x003\0foo\0").is_ok());
    }

    #[test]
    fn trailing_bytes_left_in_stream() {
        let first = Descriptor::new(OBJECT, DescriptorType::Folder, "src").unwrap();
        let second = Descriptor::new("abc", DescriptorType::File, "main.rs").unwrap();
        let mut buf = Vec::new();
        first.write_to(&mut buf).unwrap();
        second.write_to(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(Descriptor::read_from(&mut cursor).unwrap(), first);
        assert_eq!(Descriptor::read_from(&mut cursor).unwrap(), second);
        assert_eq!(cursor.position() as usize, cursor.get_ref().len());
    }

    #[test]
    fn channel_errors_propagate() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
        }
        let err = Descriptor::read_from(&mut Failing).unwrap_err();
        match err {
            FormatError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected I/O error, got {other}"),
        }
    }

    #[test]
    fn interrupted_reads_are_retried() {
        struct Flaky {
            inner: Cursor<Vec<u8>>,
            interrupt: bool,
        }
        impl Read for Flaky {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                self.interrupt = !self.interrupt;
                if self.interrupt {
                    return Err(io::Error::from(io::ErrorKind::Interrupted));
                }
                let n = buf.len().min(1);
                self.inner.read(&mut buf[..n])
            }
        }

        let expected = Descriptor::new(OBJECT, DescriptorType::File, "foo").unwrap();
        let mut reader = Flaky {
            inner: Cursor::new(expected.to_bytes()),
            interrupt: false,
        };
        assert_eq!(Descriptor::read_from(&mut reader).unwrap(), expected);
    }

    /// Returns `Err(UnexpectedEof)` instead of `Ok(0)` once its data runs out.
    struct EofErrorReader {
        data: Vec<u8>,
        pos: usize,
    }

    impl Read for EofErrorReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.data.len() {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
            }
            let n = buf.len().min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn channel_eof_error_is_malformed_eof() {
        let full = format!("28\0{OBJECT}\0b\x003\0foo\0").into_bytes();
        let cases = [
            (0, DecodeState::ObjectNameLength),
            (1, DecodeState::ObjectNameLength),
            (10, DecodeState::ObjectName),
            (3 + 0x28, DecodeState::ObjectName),
            (3 + 0x28 + 1, DecodeState::Type),
            (3 + 0x28 + 2, DecodeState::Type),
            (3 + 0x28 + 4, DecodeState::NameLength),
            (3 + 0x28 + 7, DecodeState::Name),
        ];
        for (cut, state) in cases {
            let mut reader = EofErrorReader {
                data: full[..cut].to_vec(),
                pos: 0,
            };
            let err = Descriptor::read_from(&mut reader).unwrap_err();
            assert_eq!(
                err.malformed_at(),
                Some((state, MalformedReason::UnexpectedEof)),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn decode_counted_reports_bytes_consumed() {
        let decoder = DescriptorDecoder::default();
        let bytes = format!("0028\0{OBJECT}\0b\x00003\0foo\0trailing");
        let (d, consumed) = decoder.decode_counted(&mut bytes.as_bytes()).unwrap();
        assert_eq!(consumed, bytes.len() - "trailing".len());
        assert_eq!(d.encoded_len() + 4, consumed);

        let canonical = d.to_bytes();
        let (_, consumed) = decoder.decode_counted(&mut canonical.as_slice()).unwrap();
        assert_eq!(consumed, canonical.len());
    }
}
