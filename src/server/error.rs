//! Error type of the object model.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// An accessor was called on a handle that wraps no native object.
    #[error("{0} handle is null")]
    NullHandle(&'static str),

    /// The native layer returned null while creating an object.
    #[error("failed to create native {0}")]
    NativeCreateFailed(&'static str),

    /// The dispatch entry point received a null pointer.
    #[error("invalid dispatch: {0} is null")]
    InvalidDispatch(&'static str),

    #[error("unknown signature type '{0}'")]
    UnknownSignatureType(char),

    #[error("new_id argument {index} of {message} has no interface")]
    UntypedNewId { message: &'static str, index: usize },

    #[error("missing argument {index} for {message}")]
    MissingArgument { message: &'static str, index: usize },

    #[error("argument {index} of {message}: expected {expected}, got {found}")]
    ArgumentMismatch {
        message: &'static str,
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{message} takes {expected} arguments, got {found}")]
    ArgumentCount {
        message: &'static str,
        expected: usize,
        found: usize,
    },

    /// A resource already carries an events table of another type.
    #[error("resource {class}@{id} already has a different events table")]
    EventsMismatch { class: &'static str, id: u32 },

    /// The event source was removed from its loop.
    #[error("event source is no longer registered")]
    StaleSource,

    #[error("{class} has no event with opcode {opcode}")]
    UnknownOpcode { class: &'static str, opcode: u32 },

    /// A resource whose class matches no known interface table.
    #[error("no interface table for {0}")]
    UnknownInterface(&'static str),

    /// libwayland drops the client when a non-nullable object is null.
    #[error("argument {index} of {message} is not nullable")]
    NullArgument { message: &'static str, index: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}
