//! masked-io: keyword-redacting writer for log and console sinks
//!
//! This crate provides [`MaskedWriter`], an [`std::io::Write`] adapter that
//! replaces configured keywords with a mask token before the bytes reach the
//! underlying sink. Put it between application code and a log file, a
//! terminal or a network stream so that secrets never make it to the output.
//!
//! # Features
//!
//! - **Split-write safe**: a keyword spread over several `write` calls is
//!   still masked; a chunk ending in a possible keyword prefix is held back
//! - **Single-pass masking** with a leftmost-longest Aho-Corasick automaton
//! - **Live rules**: keywords and the mask token can change while writers are
//!   in use, and a [`Rule`] can be shared by many writers or copied per writer
//! - **Bounded holding**: held data is flushed automatically a short delay
//!   after it was first held unless auto-flush is disabled, and always when
//!   the writer is dropped
//! - **Configuration** from TOML files and `MASKED_IO_*` environment variables
//!
//! # Example
//!
//! ```rust
//! use std::io::Write;
//! use masked_io::MaskedWriter;
//!
//! let mut writer = MaskedWriter::builder(Vec::new())
//!     .keywords(["secret", "passw0rd"])
//!     .auto_flush(false)
//!     .build();
//!
//! writer.write_all(b"password: passw0rd or secret").unwrap();
//! assert_eq!(writer.into_inner().unwrap(), b"password: ***** or *****");
//! ```
//!
//! # Sharing rules
//!
//! ```rust
//! use std::io::Write;
//! use masked_io::MaskedWriter;
//!
//! let stdout_writer = MaskedWriter::new(Vec::new());
//! let file_writer = stdout_writer.derive_shared(Vec::new());
//!
//! // Visible to both writers.
//! stdout_writer.add_keywords(["token-123"]);
//! assert_eq!(file_writer.rule().keywords(), vec!["token-123".to_string()]);
//! ```

pub mod config;
pub mod error;
pub mod rule;
mod timer;
pub mod writer;

pub use config::{EnvConfig, MaskConfig};
pub use error::{MaskError, Result};
pub use rule::{DEFAULT_MASK_TOKEN, Rule};
pub use writer::{DEFAULT_FLUSH_DELAY, IntoInnerError, MaskedWriter, MaskedWriterBuilder};

// Test utilities
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::{FailingSink, SharedSink};
