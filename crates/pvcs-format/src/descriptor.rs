use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::decode::DescriptorDecoder;
use crate::encode;
use crate::error::{FormatError, FormatResult, ParseTypeError};

/// Whether a descriptor names a file or a folder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorType {
    /// The object is file content.
    File,
    /// The object is a folder listing.
    Folder,
}

impl DescriptorType {
    /// The canonical (lowercase) type byte written on encode.
    pub fn type_byte(&self) -> u8 {
        match self {
            Self::File => b'b',
            Self::Folder => b't',
        }
    }

    /// Parse a type byte. Either case is accepted.
    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            b'b' | b'B' => Some(Self::File),
            b't' | b'T' => Some(Self::Folder),
            _ => None,
        }
    }
}

impl fmt::Display for DescriptorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Folder => write!(f, "folder"),
        }
    }
}

impl FromStr for DescriptorType {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" | "b" => Ok(Self::File),
            "folder" | "t" => Ok(Self::Folder),
            _ => Err(ParseTypeError(s.to_string())),
        }
    }
}

/// Names a file or folder and binds it to a content-addressed object.
///
/// Both text fields are non-empty for every value of this type; the only
/// ways to obtain a `Descriptor` are [`Descriptor::new`], decoding, and
/// deserialization, all of which validate. Equality and hashing are
/// structural over all three fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "DescriptorFields")]
pub struct Descriptor {
    object_name: String,
    descriptor_type: DescriptorType,
    name: String,
}

#[derive(Deserialize)]
struct DescriptorFields {
    object_name: String,
    descriptor_type: DescriptorType,
    name: String,
}

impl TryFrom<DescriptorFields> for Descriptor {
    type Error = FormatError;

    fn try_from(fields: DescriptorFields) -> FormatResult<Self> {
        Self::new(fields.object_name, fields.descriptor_type, fields.name)
    }
}

impl Descriptor {
    /// Create a descriptor, rejecting an empty `object_name` or `name`.
    pub fn new(
        object_name: impl Into<String>,
        descriptor_type: DescriptorType,
        name: impl Into<String>,
    ) -> FormatResult<Self> {
        let object_name = object_name.into();
        if object_name.is_empty() {
            return Err(FormatError::EmptyField {
                field: "object_name",
            });
        }
        let name = name.into();
        if name.is_empty() {
            return Err(FormatError::EmptyField { field: "name" });
        }
        Ok(Self {
            object_name,
            descriptor_type,
            name,
        })
    }

    /// The object name of the referenced content.
    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    /// Whether this is a file or a folder.
    pub fn descriptor_type(&self) -> DescriptorType {
        self.descriptor_type
    }

    /// The file or folder name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_file(&self) -> bool {
        self.descriptor_type == DescriptorType::File
    }

    pub fn is_folder(&self) -> bool {
        self.descriptor_type == DescriptorType::Folder
    }

    /// Decode one descriptor from `reader` with the default configuration.
    ///
    /// On error the reader's position is unspecified.
    pub fn read_from(reader: &mut impl Read) -> FormatResult<Self> {
        DescriptorDecoder::default().decode(reader)
    }

    /// Write the canonical encoding to `writer`, returning the byte count.
    pub fn write_to(&self, writer: &mut impl Write) -> FormatResult<usize> {
        encode::write_descriptor(self, writer)
    }

    /// Decode one descriptor from the front of `data`. Trailing bytes are ignored.
    pub fn from_bytes(data: &[u8]) -> FormatResult<Self> {
        let mut cursor = data;
        Self::read_from(&mut cursor)
    }

    /// The canonical encoding as a byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        encode::write_descriptor(self, &mut buf).expect("writing to a Vec cannot fail");
        buf
    }

    /// Exact size in bytes of the canonical encoding.
    pub fn encoded_len(&self) -> usize {
        encode::text_len(&self.object_name) + 2 + encode::text_len(&self.name)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.descriptor_type, self.object_name, self.name
        )
    }
}
