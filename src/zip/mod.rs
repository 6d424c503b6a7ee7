//! ZIP container reading and writing.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`extractor`]: Member decompression and verification
//! - [`writer`]: Streaming archive writer
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! Reading starts from the EOCD, then the Central Directory, so listing an
//! archive never touches member data.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions when reading
//! - STORED and DEFLATE compression methods
//! - CRC-32 verification of every extracted member
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No ZIP64 output; the writer refuses members or archives past 4 GiB

mod extractor;
mod parser;
mod structures;
mod writer;

pub use extractor::{MemberReader, ZipExtractor};
pub use parser::ZipParser;
pub use structures::*;
pub use writer::ZipWriter;
