//! localdb-core - safe wrapper around the SQL Server LocalDB instance
//! management API.
//!
//! The vendor library owns all instance semantics (the instance registry,
//! engine process lifecycle, connection brokering); this crate owns only the
//! marshalling: argument validation, fixed-size native records, and
//! result/error conversion. Four operations are exposed: describe, start,
//! stop and enumerate.
//!
//! All operations are synchronous and stateless. Validation failures are
//! raised before any native call; native failures always surface to the
//! caller with the result code embedded in the message.
//!
//! # Example
//!
//! ```rust,ignore
//! use localdb_core::InstanceManager;
//!
//! fn main() -> localdb_core::Result<()> {
//!     let manager = InstanceManager::open()?;
//!     for name in manager.list_instance_names()? {
//!         if let Some(info) = manager.describe_instance(&name)? {
//!             println!("{}: running={}", info.name, info.running);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod ffi;
pub mod instances;

// Re-export commonly used types
pub use error::{LocalDbError, Result};
pub use ffi::native::NativeLibrary;
pub use ffi::HResult;
pub use instances::{
    validate_instance_name, InstanceApi, InstanceInfo, InstanceManager, StopOptions,
};
