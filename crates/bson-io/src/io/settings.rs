//! Settings for the readers and writers.

use crate::guid::GuidRepresentation;

/// Largest document the binary format can describe.
pub const DEFAULT_MAX_DOCUMENT_SIZE: usize = i32::MAX as usize;

/// Nesting depth at which writers refuse to go deeper.
pub const DEFAULT_MAX_SERIALIZATION_DEPTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BsonBinaryReaderSettings {
    /// Representation `read_guid` assumes for subtype 3 payloads.
    pub guid_representation: GuidRepresentation,
    pub max_document_size: usize,
    /// Report subtype 2 (old binary) as subtype 0.
    pub fix_old_binary_subtype_on_input: bool,
}

impl Default for BsonBinaryReaderSettings {
    fn default() -> Self {
        Self {
            guid_representation: GuidRepresentation::Unspecified,
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
            fix_old_binary_subtype_on_input: true,
        }
    }
}

impl BsonBinaryReaderSettings {
    pub fn with_guid_representation(mut self, representation: GuidRepresentation) -> Self {
        self.guid_representation = representation;
        self
    }

    pub fn with_max_document_size(mut self, max_document_size: usize) -> Self {
        self.max_document_size = max_document_size;
        self
    }

    pub fn with_fix_old_binary_subtype_on_input(mut self, fix: bool) -> Self {
        self.fix_old_binary_subtype_on_input = fix;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BsonBinaryWriterSettings {
    /// Representation `write_guid` encodes with.
    pub guid_representation: GuidRepresentation,
    pub max_document_size: usize,
    /// Write subtype 2 (old binary) as plain subtype 0.
    pub fix_old_binary_subtype_on_output: bool,
    pub max_serialization_depth: usize,
}

impl Default for BsonBinaryWriterSettings {
    fn default() -> Self {
        Self {
            guid_representation: GuidRepresentation::Unspecified,
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
            fix_old_binary_subtype_on_output: true,
            max_serialization_depth: DEFAULT_MAX_SERIALIZATION_DEPTH,
        }
    }
}

impl BsonBinaryWriterSettings {
    pub fn with_guid_representation(mut self, representation: GuidRepresentation) -> Self {
        self.guid_representation = representation;
        self
    }

    pub fn with_max_document_size(mut self, max_document_size: usize) -> Self {
        self.max_document_size = max_document_size;
        self
    }

    pub fn with_fix_old_binary_subtype_on_output(mut self, fix: bool) -> Self {
        self.fix_old_binary_subtype_on_output = fix;
        self
    }

    pub fn with_max_serialization_depth(mut self, depth: usize) -> Self {
        self.max_serialization_depth = depth;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonReaderSettings {
    /// Representation assumed for subtype 3 payloads and `UUID`-style constructors.
    pub guid_representation: GuidRepresentation,
}

impl JsonReaderSettings {
    pub fn with_guid_representation(mut self, representation: GuidRepresentation) -> Self {
        self.guid_representation = representation;
        self
    }
}

/// Text flavour produced by the JSON writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonOutputMode {
    /// Shell constructor syntax: `ObjectId("...")`, `ISODate("...")`.
    #[default]
    Shell,
    /// `$`-prefixed wrapper objects only.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonWriterSettings {
    pub output_mode: JsonOutputMode,
    pub indent: bool,
    pub indent_chars: String,
    pub new_line_chars: String,
    /// Representation used to render subtype 3 payloads and `write_guid`.
    pub guid_representation: GuidRepresentation,
    pub max_serialization_depth: usize,
}

impl Default for JsonWriterSettings {
    fn default() -> Self {
        Self {
            output_mode: JsonOutputMode::Shell,
            indent: false,
            indent_chars: "  ".to_string(),
            new_line_chars: "\r\n".to_string(),
            guid_representation: GuidRepresentation::CSharpLegacy,
            max_serialization_depth: DEFAULT_MAX_SERIALIZATION_DEPTH,
        }
    }
}

impl JsonWriterSettings {
    /// Strict output with default everything else.
    pub fn strict() -> Self {
        Self {
            output_mode: JsonOutputMode::Strict,
            ..Self::default()
        }
    }

    pub fn with_output_mode(mut self, output_mode: JsonOutputMode) -> Self {
        self.output_mode = output_mode;
        self
    }

    pub fn with_indent(mut self, indent: bool) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_indent_chars(mut self, indent_chars: impl Into<String>) -> Self {
        self.indent_chars = indent_chars.into();
        self
    }

    pub fn with_new_line_chars(mut self, new_line_chars: impl Into<String>) -> Self {
        self.new_line_chars = new_line_chars.into();
        self
    }

    pub fn with_guid_representation(mut self, representation: GuidRepresentation) -> Self {
        self.guid_representation = representation;
        self
    }

    pub fn with_max_serialization_depth(mut self, depth: usize) -> Self {
        self.max_serialization_depth = depth;
        self
    }
}
