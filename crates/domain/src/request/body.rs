//! HTTP request body types

use serde::Serialize;
use serde_json::Value;

/// Body of an outbound API request.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    /// No body
    #[default]
    Empty,
    /// JSON document, sent as `application/json`
    Json(Value),
    /// Multipart form for file uploads; the transport owns the boundary
    Multipart(MultipartForm),
}

impl RequestBody {
    /// Creates a JSON body from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `value` cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::Json)
    }

    /// Returns whether there is nothing to send.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns the content type the client sets explicitly.
    ///
    /// Multipart bodies return `None` so the transport can add its own
    /// boundary parameter.
    #[must_use]
    pub const fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Json(_) => Some("application/json"),
            Self::Empty | Self::Multipart(_) => None,
        }
    }
}

/// Multipart form with text fields and file parts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultipartForm {
    /// Parts in the order they are sent.
    pub parts: Vec<FormPart>,
}

impl MultipartForm {
    /// Creates an empty form.
    #[must_use]
    pub const fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Adds a text field.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: PartValue::Text(value.into()),
        });
        self
    }

    /// Adds a file part. The content type is guessed from the file name by
    /// the transport when `content_type` is `None`.
    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: PartValue::File {
                file_name: file_name.into(),
                content_type,
                bytes,
            },
        });
        self
    }

    /// Returns whether the form has no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// A single named part of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    /// Field name
    pub name: String,
    /// Field payload
    pub value: PartValue,
}

/// Payload of a multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartValue {
    /// Plain text field
    Text(String),
    /// File upload
    File {
        /// File name reported to the server
        file_name: String,
        /// Explicit MIME type, if known
        content_type: Option<String>,
        /// File contents
        bytes: Vec<u8>,
    },
}
