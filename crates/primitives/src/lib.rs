//! Core value types for completion mixing: selections, buffer states,
//! snippets and completions.

/// Immutable buffers, buffer states and their content hashes.
pub mod buffer;
/// Completions and their composition, validation and display.
pub mod completion;
/// Byte ranges within buffers and snippets.
pub mod selection;
/// Inserted text with placeholders.
pub mod snippet;

pub use buffer::{Buffer, BufferHash, CURSOR_MARK, SelectedBuffer, SelectedBufferHash, SelectionError, content_hash};
pub use completion::{ComposeError, Completion, DisplayOptions, trailing_ident};
pub use selection::{ByteIdx, Selection};
pub use snippet::{Placeholders, Snippet, SnippetError};
