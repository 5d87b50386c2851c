//! Pipeline stages for print-job preparation.
//!
//! ## Data Flow
//!
//! ```text
//!                        ┌──▶ gzip sink ────────────▶ compressed payload
//! input ──▶ distribute ──┼──▶ renderer process ──▶ preview ──▶ preview container
//! (path/-/URL) (64 KiB)  └──▶ analyzer process ──▶ inkcov  ──▶ descriptor
//! ```
//!
//! 1. [`input`]     : canonicalise the user-supplied path, `-`, or URL to a reader
//! 2. [`distribute`]: read the document once and write every chunk to each
//!    live [`sink::Sink`]
//! 3. [`compress`]  : bounded queue + blocking gzip worker
//! 4. [`process`]   : external renderer/analyzer with stdin fed through a
//!    [`pipe::PipeWriter`] and stdout drained concurrently
//! 5. [`preview`]   : split renderer output into pages and pack the container
//! 6. [`inkcov`]    : parse the ink report and classify pages
//! 7. [`descriptor`]: aggregate counts for the API client

pub mod compress;
pub mod descriptor;
pub mod distribute;
pub mod inkcov;
pub mod input;
pub mod pipe;
pub mod preview;
pub mod process;
pub mod sink;
