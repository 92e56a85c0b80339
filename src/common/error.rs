use thiserror::Error;

/// Result type for classgen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for class emission.
///
/// All of these are fatal to the current class emission and propagate
/// out of `emit_class`; malformed input is a bug in the producer of the
/// tree, not a user-recoverable condition.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The tree contained a node the emitter does not recognize in the
    /// position it appeared. Indicates parser/emitter version skew.
    #[error("unknown node: {message}")]
    UnknownNode { message: String },

    /// An emitter invariant was violated (label placed twice, jump to a
    /// label outside any loop, forbidden context combination).
    #[error("invariant violation: {message}")]
    Invariant { message: String },

    /// The class-writer facade rejected a request (unplaced label
    /// referenced by a jump or exception entry, branch offset overflow,
    /// constant pool overflow).
    #[error("backend failure: {message}")]
    Backend { message: String },
}

impl Error {
    pub fn unknown_node(message: impl Into<String>) -> Self {
        Self::UnknownNode { message: message.into() }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant { message: message.into() }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into() }
    }
}
