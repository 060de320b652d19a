//! Instance operations: validation, native calls, result conversion.
//!
//! Everything here is stateless marshalling. Each operation validates its
//! arguments, performs at most two native calls, converts the fixed-size
//! native records into owned values and returns. Nothing is cached, retried
//! or shared between calls; transient buffers never outlive a call.

use serde::Serialize;
use tracing::debug;

use crate::error::{LocalDbError, Result};
use crate::ffi::{self, HResult, InstanceInfoRec, InstanceNameRec};

/// The four native entry points of the vendor instance API.
///
/// Implemented by [`NativeLibrary`](crate::ffi::native::NativeLibrary) over
/// the loaded vendor DLL; tests substitute a scripted fake. Signatures stay
/// close to the native calls so every marshalling decision lives in
/// [`InstanceManager`] where it can be exercised on any platform.
pub trait InstanceApi {
    /// `LocalDBGetInstanceInfo`.
    fn get_instance_info(&self, name: &[u16], info: &mut InstanceInfoRec) -> HResult;

    /// `LocalDBStartInstance`. `connection` and `len` form the in/out
    /// buffer receiving the connection string.
    fn start_instance(
        &self,
        name: &[u16],
        flags: u32,
        connection: &mut [u16],
        len: &mut u32,
    ) -> HResult;

    /// `LocalDBStopInstance`. Blocks for up to `timeout_secs`.
    fn stop_instance(&self, name: &[u16], flags: u32, timeout_secs: u32) -> HResult;

    /// `LocalDBGetInstances`. `names = None` probes for the required count,
    /// which the native layer reports with an insufficient-buffer result.
    fn instance_names(&self, names: Option<&mut [InstanceNameRec]>, count: &mut u32) -> HResult;
}

/// Description of one named instance.
///
/// `shared_name` and `connection_string` are present only when the native
/// record carries a non-blank value. `version`, `last_started` and
/// `owner_sid` are present only when the instance exists on disk;
/// `last_started` is Unix-epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    pub running: bool,
    pub automatic: bool,
    pub exists: bool,
    pub corrupted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_started: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_sid: Option<String>,
}

/// Options for [`InstanceManager::stop_instance`].
///
/// Each field distinguishes "absent" from a supplied value because absence
/// and `false` behave differently during resolution (see [`Self::resolve`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopOptions {
    /// Seconds to wait for shutdown. Defaults to 10; 0 requests shutdown
    /// without waiting for a response. Negative values are rejected.
    pub timeout: Option<f64>,
    /// Forcibly terminate the instance's managing process.
    pub kill: Option<bool>,
    /// Shut down without waiting for acknowledgment.
    pub no_wait: Option<bool>,
}

impl StopOptions {
    pub const DEFAULT_TIMEOUT_SECS: u32 = 10;

    /// Resolve to the native `(flags, timeout_secs)` pair.
    ///
    /// `kill` takes precedence over `no_wait`: `no_wait` is consulted only
    /// when `kill` is absent, so a supplied-but-false `kill` suppresses
    /// `no_wait` entirely. Callers have relied on this asymmetry; DESIGN.md
    /// records why it is kept as-is.
    pub fn resolve(&self) -> Result<(u32, u32)> {
        let timeout = match self.timeout {
            None => Self::DEFAULT_TIMEOUT_SECS,
            Some(secs) if secs < 0.0 => {
                return Err(LocalDbError::InvalidArgument("negative timeout".into()));
            }
            Some(secs) => secs as u32,
        };

        let mut flags = 0;
        if let Some(kill) = self.kill {
            if kill {
                flags = ffi::SHUTDOWN_KILL_PROCESS;
            }
        } else if let Some(no_wait) = self.no_wait {
            if no_wait {
                flags = ffi::SHUTDOWN_WITH_NOWAIT;
            }
        }
        Ok((flags, timeout))
    }
}

/// Safe front end over the four native instance operations.
///
/// Stateless request/response: concurrent callers are not coordinated here —
/// mutual exclusion on a named instance belongs to the external management
/// service.
pub struct InstanceManager<A: InstanceApi> {
    api: A,
}

impl InstanceManager<crate::ffi::native::NativeLibrary> {
    /// Load the installed vendor instance API and wrap it.
    pub fn open() -> Result<Self> {
        Ok(Self::new(crate::ffi::native::NativeLibrary::open()?))
    }
}

impl<A: InstanceApi> InstanceManager<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Describe a named instance.
    ///
    /// Returns `Ok(None)` when the instance neither exists nor is
    /// configured for automatic start — absence, not an error.
    pub fn describe_instance(&self, name: &str) -> Result<Option<InstanceInfo>> {
        let wname = validate_name(name)?;
        let mut rec = InstanceInfoRec::new();
        check(
            self.api.get_instance_info(&wname, &mut rec),
            "LocalDBGetInstanceInfo",
        )?;

        let exists = rec.exists != 0;
        let automatic = rec.is_automatic != 0;
        if !(exists || automatic) {
            debug!("Instance {} neither exists nor is automatic", name);
            return Ok(None);
        }

        let mut info = InstanceInfo {
            name: ffi::wide_to_string(&rec.instance_name),
            shared_name: non_blank(&rec.shared_instance_name),
            connection_string: non_blank(&rec.connection),
            running: rec.is_running != 0,
            automatic,
            exists,
            corrupted: rec.configuration_corrupted != 0,
            version: None,
            last_started: None,
            owner_sid: None,
        };
        if exists {
            info.version = Some(format!(
                "{}.{}.{}.{}",
                rec.major, rec.minor, rec.build, rec.revision
            ));
            info.last_started = Some(ffi::filetime_to_unix_ms(rec.last_start_utc));
            info.owner_sid = Some(ffi::wide_to_string(&rec.owner_sid));
        }
        Ok(Some(info))
    }

    /// Start a named instance and return its connection string (a named-pipe
    /// style address, opaque to this layer).
    pub fn start_instance(&self, name: &str) -> Result<String> {
        let wname = validate_name(name)?;
        debug!("Starting instance {}", name);

        let mut connection = [0u16; ffi::MAX_CONNECTION_LEN];
        let mut len = ffi::MAX_CONNECTION_LEN as u32;
        check(
            self.api.start_instance(&wname, 0, &mut connection, &mut len),
            "LocalDBStartInstance",
        )?;
        Ok(ffi::wide_to_string(&connection))
    }

    /// Stop a named instance. Blocks for up to the resolved timeout.
    pub fn stop_instance(&self, name: &str, options: &StopOptions) -> Result<()> {
        let wname = validate_name(name)?;
        let (flags, timeout) = options.resolve()?;
        debug!(
            "Stopping instance {} (flags={:#x}, timeout={}s)",
            name, flags, timeout
        );
        check(
            self.api.stop_instance(&wname, flags, timeout),
            "LocalDBStopInstance",
        )
    }

    /// Enumerate instance names, in whatever order the native layer reports.
    ///
    /// Probe-then-fill: one call with no buffer learns the count, a second
    /// fills an exactly-sized buffer. The buffer is scoped to this call.
    pub fn list_instance_names(&self) -> Result<Vec<String>> {
        let mut count = 0u32;
        let hr = self.api.instance_names(None, &mut count);
        // An insufficient-buffer result is how the probe reports the count.
        if hr != ffi::LOCALDB_ERROR_INSUFFICIENT_BUFFER {
            check(hr, "LocalDBGetInstances")?;
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut names: Vec<InstanceNameRec> = Vec::new();
        names
            .try_reserve_exact(count as usize)
            .map_err(|_| LocalDbError::Allocation)?;
        names.resize(count as usize, InstanceNameRec::EMPTY);

        check(
            self.api.instance_names(Some(&mut names), &mut count),
            "LocalDBGetInstances",
        )?;
        names.truncate(count as usize);
        Ok(names.iter().map(InstanceNameRec::to_string_lossy).collect())
    }
}

/// Validate an instance name without touching the native layer.
///
/// Length limits are in UTF-16 code units, matching the native layer.
/// Bindings call this up front so a bad name is reported before anything
/// else happens — including before the vendor library is even loaded.
pub fn validate_instance_name(name: &str) -> Result<()> {
    let units = name.encode_utf16().count();
    if units == 0 || units > ffi::MAX_INSTANCE_NAME_LEN {
        return Err(LocalDbError::InvalidArgument("Invalid instance name".into()));
    }
    Ok(())
}

/// Validate an instance name and encode it as a NUL-terminated wide string.
fn validate_name(name: &str) -> Result<Vec<u16>> {
    validate_instance_name(name)?;
    Ok(ffi::to_wide(name))
}

fn check(hr: HResult, method: &'static str) -> Result<()> {
    if hr.is_success() {
        Ok(())
    } else {
        Err(LocalDbError::Api { method, code: hr })
    }
}

fn non_blank(buf: &[u16]) -> Option<String> {
    if buf.first().copied().unwrap_or(0) == 0 {
        None
    } else {
        Some(ffi::wide_to_string(buf))
    }
}
