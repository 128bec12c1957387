//! VFS layer (stream wrapper)
//!
//! Responsibilities:
//! - Map `scheme://target` URIs onto flat object keys (`path`).
//! - Manage open handles and whole-object uploads (`stream`).
//! - Emulate directories over key prefixes (`dir`).
//! - Keep the metadata cache coherent around every mutation (`fs`).
//!
//! Submodules:
//! - `path`: URI/key resolver and derivative path helpers
//! - `stream`: `OpenMode` and `StreamHandle`
//! - `dir`: `FileStat`, `DirListing`, stat/mkdir/rmdir/listing
//! - `fs`: the `Gcsfs` facade
//! - `error`: `FsError`
pub mod dir;
pub mod error;
pub mod fs;
pub mod path;
pub mod stream;

pub use dir::{DirListing, FileStat, FileType};
pub use error::{FsError, FsResult};
pub use fs::{Gcsfs, MetadataOption};
pub use stream::{OpenMode, StreamHandle};
