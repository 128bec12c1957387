//! Object store adapter (cAdapter)
//!
//! Submodules:
//! - `client`: the `ObjectBackend` capability and the `ObjectClient` handle
//!   used by the stream wrapper
//! - `s3`: S3-compatible adapter (the bucket service's interoperability API)
//! - `localfs`: directory-backed adapter for development and tests
//!
//! Responsibilities summary:
//! - Provide an async API for exists/get/put/delete/list/info on one bucket.
//! - Report "object absent" as `Ok(None)`/`Ok(false)`, never as an error.
//! - Leave retries and transport timeouts to the underlying SDK.
pub mod client;
pub mod localfs;
pub mod s3;

pub use client::{ObjectBackend, ObjectClient, ObjectInfo, ObjectListing};
