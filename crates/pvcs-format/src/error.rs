use std::fmt;

/// The decode step that was running when a descriptor was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecodeState {
    /// Reading the hex length of the object name.
    ObjectNameLength,
    /// Reading the object name bytes and their terminator.
    ObjectName,
    /// Reading the type byte and its terminator.
    Type,
    /// Reading the hex length of the display name.
    NameLength,
    /// Reading the display name bytes and their terminator.
    Name,
}

impl fmt::Display for DecodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectNameLength => write!(f, "object name length"),
            Self::ObjectName => write!(f, "object name"),
            Self::Type => write!(f, "descriptor type"),
            Self::NameLength => write!(f, "name length"),
            Self::Name => write!(f, "name"),
        }
    }
}

/// Why a byte stream is not a valid descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MalformedReason {
    #[error("non-hexadecimal digit 0x{byte:02x} in length field")]
    NonHexDigit { byte: u8 },

    #[error("zero length is not permitted")]
    ZeroLength,

    #[error("length field overflows usize")]
    LengthOverflow,

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("expected terminator, found 0x{found:02x}")]
    ExpectedTerminator { found: u8 },

    #[error("unrecognized descriptor type 0x{byte:02x}")]
    UnknownType { byte: u8 },

    #[error("text is not valid UTF-8")]
    InvalidUtf8,

    #[error("declared length {length} exceeds limit {max}")]
    FieldTooLong { length: usize, max: usize },
}

/// Errors from descriptor construction and coding.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// A required text field was empty at construction.
    #[error("invalid argument: {field} must not be empty")]
    EmptyField { field: &'static str },

    /// The input is not a valid descriptor.
    #[error("malformed descriptor at {state}: {reason}")]
    Malformed {
        state: DecodeState,
        reason: MalformedReason,
    },

    /// I/O error from the underlying channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FormatError {
    pub(crate) fn malformed(state: DecodeState, reason: MalformedReason) -> Self {
        Self::Malformed { state, reason }
    }

    /// Returns `true` for construction-time argument errors.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::EmptyField { .. })
    }

    /// Returns `true` when the input was rejected as not a descriptor.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }

    /// The state and reason of a malformed-input error.
    pub fn malformed_at(&self) -> Option<(DecodeState, MalformedReason)> {
        match self {
            Self::Malformed { state, reason } => Some((*state, *reason)),
            _ => None,
        }
    }

    /// The reason of a malformed-input error.
    pub fn malformed_reason(&self) -> Option<MalformedReason> {
        self.malformed_at().map(|(_, reason)| reason)
    }
}

/// Error returned when parsing a [`DescriptorType`](crate::DescriptorType) from text.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown descriptor type {0:?}, expected \"file\" or \"folder\"")]
pub struct ParseTypeError(pub String);

/// Result alias for format operations.
pub type FormatResult<T> = Result<T, FormatError>;
