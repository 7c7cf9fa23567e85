use itertools::Itertools;
use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// A read that would cross the end of the supplied byte range.
    pub fn out_of_range(
        position: usize,
        requested: usize,
        length: usize,
        context: impl Into<String>,
    ) -> Error {
        Error(
            ErrorKind::OutOfRange {
                position,
                requested,
                length,
                context: context.into(),
            }
            .into(),
        )
    }

    /// A structural expectation of the stream was violated (missing terminator,
    /// impossible length, count disagreement).
    pub fn malformed_stream(
        offset: usize,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> Error {
        Error(
            ErrorKind::MalformedStream {
                offset,
                context: context.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    /// A declared framed byte count does not match the bytes actually consumed.
    ///
    /// `breadcrumbs` is the trail of decoders active when the mismatch
    /// surfaced, outermost first; these mismatches only show up deep inside
    /// nested containers, so the trail is part of the error contract.
    pub fn framing_mismatch(declared: u64, observed: u64, breadcrumbs: &[String]) -> Error {
        Error(
            ErrorKind::FramingMismatch {
                declared,
                observed,
                breadcrumbs: breadcrumbs.iter().join(" > "),
            }
            .into(),
        )
    }

    /// A type descriptor failed to parse. `position` is the byte offset of the
    /// offending token within `text`; the rendered form carries a caret pointer
    /// so deeply nested templates stay debuggable.
    pub fn unknown_type(
        position: usize,
        text: impl Into<String>,
        detail: impl Into<String>,
    ) -> Error {
        let text = text.into();
        let caret = format!("{}^", " ".repeat(position.min(text.len())));
        let rendered = format!("{text}\n{caret}");
        Error(
            ErrorKind::UnknownType {
                position,
                detail: detail.into(),
                rendered,
            }
            .into(),
        )
    }

    /// A back-reference tag with no entry in the reference table.
    pub fn unresolved_reference(tag: u32, known_tags: impl IntoIterator<Item = u32>) -> Error {
        Error(
            ErrorKind::UnresolvedReference {
                tag,
                known: known_tags.into_iter().map(|t| t.to_string()).join(", "),
            }
            .into(),
        )
    }

    /// An attempt to decode a grouping column directly. Not a corruption; the
    /// message names the sub-columns the caller should read instead.
    pub fn not_directly_readable(
        column: impl Into<String>,
        sub_columns: impl IntoIterator<Item = String>,
    ) -> Error {
        Error(
            ErrorKind::NotDirectlyReadable {
                column: column.into(),
                sub_columns: sub_columns.into_iter().join(", "),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error(
        "read of {requested} bytes at position {position} exceeds the {length}-byte range ({context})"
    )]
    OutOfRange {
        position: usize,
        requested: usize,
        length: usize,
        context: String,
    },

    #[error("malformed stream at byte {offset} ({context}): {message}")]
    MalformedStream {
        offset: usize,
        context: String,
        message: String,
    },

    #[error(
        "framing mismatch: declared {declared} bytes, consumed {observed}; while decoding {breadcrumbs}"
    )]
    FramingMismatch {
        declared: u64,
        observed: u64,
        breadcrumbs: String,
    },

    #[error("cannot parse type descriptor at offset {position}: {detail}\n{rendered}")]
    UnknownType {
        position: usize,
        detail: String,
        rendered: String,
    },

    #[error("unresolved back-reference tag {tag} (known tags: [{known}])")]
    UnresolvedReference { tag: u32, known: String },

    #[error("column '{column}' is not directly readable; read its sub-columns instead: {sub_columns}")]
    NotDirectlyReadable { column: String, sub_columns: String },

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}
