// Library crate for gcsfs: re-export internal modules for the CLI and for
// embedding applications.

pub mod cadapter;
pub mod config;
pub mod meta;
pub mod vfs;

pub use config::GcsfsConfig;
pub use vfs::{FileStat, FsError, Gcsfs, OpenMode, StreamHandle};
