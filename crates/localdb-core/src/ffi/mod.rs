//! Raw ABI surface of the vendor instance API.
//!
//! Fixed-size records, result codes and buffer limits as declared by the
//! vendor header, plus the wide-string and FILETIME helpers the marshalling
//! layer needs. Nothing here calls the native library; loading and symbol
//! resolution live in [`native`].

use std::fmt;

pub mod native;

/// Maximum instance name length in UTF-16 code units (excluding the NUL).
pub const MAX_INSTANCE_NAME_LEN: usize = 128;

/// Connection string buffer capacity in UTF-16 code units.
pub const MAX_CONNECTION_LEN: usize = 260;

/// Maximum owner SID string length in UTF-16 code units (excluding the NUL).
pub const MAX_SID_LEN: usize = 186;

/// Shutdown flag: forcibly terminate the instance's managing process.
pub const SHUTDOWN_KILL_PROCESS: u32 = 0x1;

/// Shutdown flag: request shutdown without waiting for acknowledgment.
pub const SHUTDOWN_WITH_NOWAIT: u32 = 0x2;

/// A native result code (Windows `HRESULT`).
///
/// Non-negative values are success. Display output matches what callers see
/// in error messages: the symbolic `LOCALDB_ERROR_*` name with the hex code
/// in parentheses when recognized, the bare hex code otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HResult(pub i32);

impl HResult {
    pub const OK: HResult = HResult(0);

    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// Symbolic name of this code, when it is one of the recognized set.
    pub fn name(self) -> Option<&'static str> {
        error_name(self.0)
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:x})", name, self.0 as u32),
            None => write!(f, "0x{:x}", self.0 as u32),
        }
    }
}

macro_rules! localdb_errors {
    ($($name:ident = $value:expr;)*) => {
        $(pub const $name: HResult = HResult($value as i32);)*

        /// Look up the symbolic name of a recognized result code.
        pub fn error_name(code: i32) -> Option<&'static str> {
            $(if code == $name.0 {
                return Some(stringify!($name));
            })*
            None
        }
    };
}

// Result codes from the vendor header. The set is fixed; codes outside it
// are surfaced by hex value only.
localdb_errors! {
    LOCALDB_ERROR_CANNOT_CREATE_INSTANCE_FOLDER = 0x89C5_0100u32;
    LOCALDB_ERROR_INVALID_PARAMETER = 0x89C5_0101u32;
    LOCALDB_ERROR_INSTANCE_EXISTS_WITH_LOWER_VERSION = 0x89C5_0102u32;
    LOCALDB_ERROR_CANNOT_GET_USER_PROFILE_FOLDER = 0x89C5_0103u32;
    LOCALDB_ERROR_INSTANCE_FOLDER_PATH_TOO_LONG = 0x89C5_0104u32;
    LOCALDB_ERROR_CANNOT_ACCESS_INSTANCE_FOLDER = 0x89C5_0105u32;
    LOCALDB_ERROR_CANNOT_ACCESS_INSTANCE_REGISTRY = 0x89C5_0106u32;
    LOCALDB_ERROR_UNKNOWN_INSTANCE = 0x89C5_0107u32;
    LOCALDB_ERROR_INTERNAL_ERROR = 0x89C5_0108u32;
    LOCALDB_ERROR_CANNOT_MODIFY_INSTANCE_REGISTRY = 0x89C5_0109u32;
    LOCALDB_ERROR_SQL_SERVER_STARTUP_FAILED = 0x89C5_010Au32;
    LOCALDB_ERROR_INSTANCE_CONFIGURATION_CORRUPT = 0x89C5_010Bu32;
    LOCALDB_ERROR_CANNOT_CREATE_SQL_PROCESS = 0x89C5_010Cu32;
    LOCALDB_ERROR_UNKNOWN_VERSION = 0x89C5_010Du32;
    LOCALDB_ERROR_UNKNOWN_LANGUAGE_ID = 0x89C5_010Eu32;
    LOCALDB_ERROR_INSTANCE_STOP_FAILED = 0x89C5_010Fu32;
    LOCALDB_ERROR_UNKNOWN_ERROR_CODE = 0x89C5_0110u32;
    LOCALDB_ERROR_VERSION_REQUESTED_NOT_INSTALLED = 0x89C5_0111u32;
    LOCALDB_ERROR_INSTANCE_BUSY = 0x89C5_0112u32;
    LOCALDB_ERROR_INVALID_OPERATION = 0x89C5_0113u32;
    LOCALDB_ERROR_INSUFFICIENT_BUFFER = 0x89C5_0114u32;
    LOCALDB_ERROR_WAIT_TIMEOUT = 0x89C5_0115u32;
    LOCALDB_ERROR_XEVENT_FAILED = 0x89C5_0116u32;
    LOCALDB_ERROR_AUTO_INSTANCE_CREATE_FAILED = 0x89C5_0117u32;
    LOCALDB_ERROR_SHARED_NAME_TAKEN = 0x89C5_0118u32;
    LOCALDB_ERROR_CALLER_IS_NOT_OWNER = 0x89C5_0119u32;
    LOCALDB_ERROR_INVALID_INSTANCE_NAME = 0x89C5_011Au32;
    LOCALDB_ERROR_INSTANCE_ALREADY_SHARED = 0x89C5_011Bu32;
    LOCALDB_ERROR_INSTANCE_NOT_SHARED = 0x89C5_011Cu32;
    LOCALDB_ERROR_ADMIN_RIGHTS_REQUIRED = 0x89C5_011Du32;
    LOCALDB_ERROR_TOO_MANY_SHARED_INSTANCES = 0x89C5_011Eu32;
    LOCALDB_ERROR_CANNOT_GET_LOCAL_APP_DATA_PATH = 0x89C5_011Fu32;
    LOCALDB_ERROR_CANNOT_LOAD_RESOURCES = 0x89C5_0120u32;
    LOCALDB_ERROR_NOT_INSTALLED = 0x89C5_0121u32;
}

/// All recognized result codes, for exhaustive checks.
pub const KNOWN_ERROR_CODES: [HResult; 34] = [
    LOCALDB_ERROR_CANNOT_CREATE_INSTANCE_FOLDER,
    LOCALDB_ERROR_INVALID_PARAMETER,
    LOCALDB_ERROR_INSTANCE_EXISTS_WITH_LOWER_VERSION,
    LOCALDB_ERROR_CANNOT_GET_USER_PROFILE_FOLDER,
    LOCALDB_ERROR_INSTANCE_FOLDER_PATH_TOO_LONG,
    LOCALDB_ERROR_CANNOT_ACCESS_INSTANCE_FOLDER,
    LOCALDB_ERROR_CANNOT_ACCESS_INSTANCE_REGISTRY,
    LOCALDB_ERROR_UNKNOWN_INSTANCE,
    LOCALDB_ERROR_INTERNAL_ERROR,
    LOCALDB_ERROR_CANNOT_MODIFY_INSTANCE_REGISTRY,
    LOCALDB_ERROR_SQL_SERVER_STARTUP_FAILED,
    LOCALDB_ERROR_INSTANCE_CONFIGURATION_CORRUPT,
    LOCALDB_ERROR_CANNOT_CREATE_SQL_PROCESS,
    LOCALDB_ERROR_UNKNOWN_VERSION,
    LOCALDB_ERROR_UNKNOWN_LANGUAGE_ID,
    LOCALDB_ERROR_INSTANCE_STOP_FAILED,
    LOCALDB_ERROR_UNKNOWN_ERROR_CODE,
    LOCALDB_ERROR_VERSION_REQUESTED_NOT_INSTALLED,
    LOCALDB_ERROR_INSTANCE_BUSY,
    LOCALDB_ERROR_INVALID_OPERATION,
    LOCALDB_ERROR_INSUFFICIENT_BUFFER,
    LOCALDB_ERROR_WAIT_TIMEOUT,
    LOCALDB_ERROR_XEVENT_FAILED,
    LOCALDB_ERROR_AUTO_INSTANCE_CREATE_FAILED,
    LOCALDB_ERROR_SHARED_NAME_TAKEN,
    LOCALDB_ERROR_CALLER_IS_NOT_OWNER,
    LOCALDB_ERROR_INVALID_INSTANCE_NAME,
    LOCALDB_ERROR_INSTANCE_ALREADY_SHARED,
    LOCALDB_ERROR_INSTANCE_NOT_SHARED,
    LOCALDB_ERROR_ADMIN_RIGHTS_REQUIRED,
    LOCALDB_ERROR_TOO_MANY_SHARED_INSTANCES,
    LOCALDB_ERROR_CANNOT_GET_LOCAL_APP_DATA_PATH,
    LOCALDB_ERROR_CANNOT_LOAD_RESOURCES,
    LOCALDB_ERROR_NOT_INSTALLED,
];

/// Native `FILETIME`: 100-nanosecond ticks since 1601-01-01 UTC.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filetime {
    pub low: u32,
    pub high: u32,
}

/// Milliseconds from the FILETIME epoch (1601-01-01) to the Unix epoch.
pub const FILETIME_UNIX_EPOCH_MS: i64 = -11_644_473_600_000;

/// Convert a native FILETIME to Unix-epoch milliseconds.
pub fn filetime_to_unix_ms(t: Filetime) -> i64 {
    let ticks = ((t.high as u64) << 32) | t.low as u64;
    FILETIME_UNIX_EPOCH_MS + (ticks / 10_000) as i64
}

/// Fixed-size instance description record, laid out as the vendor declares it.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InstanceInfoRec {
    /// Size of this record in bytes; the native call validates it.
    pub size: u32,
    pub instance_name: [u16; MAX_INSTANCE_NAME_LEN + 1],
    pub exists: i32,
    pub configuration_corrupted: i32,
    pub is_running: i32,
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
    pub last_start_utc: Filetime,
    pub connection: [u16; MAX_CONNECTION_LEN],
    pub shared_instance_name: [u16; MAX_INSTANCE_NAME_LEN + 1],
    pub owner_sid: [u16; MAX_SID_LEN + 1],
    pub is_automatic: i32,
}

impl InstanceInfoRec {
    /// A zeroed record with the size field filled in.
    pub fn new() -> Self {
        Self {
            size: std::mem::size_of::<Self>() as u32,
            instance_name: [0; MAX_INSTANCE_NAME_LEN + 1],
            exists: 0,
            configuration_corrupted: 0,
            is_running: 0,
            major: 0,
            minor: 0,
            build: 0,
            revision: 0,
            last_start_utc: Filetime::default(),
            connection: [0; MAX_CONNECTION_LEN],
            shared_instance_name: [0; MAX_INSTANCE_NAME_LEN + 1],
            owner_sid: [0; MAX_SID_LEN + 1],
            is_automatic: 0,
        }
    }
}

impl Default for InstanceInfoRec {
    fn default() -> Self {
        Self::new()
    }
}

/// One fixed-width slot of the enumeration name buffer.
#[repr(transparent)]
#[derive(Debug, Clone, Copy)]
pub struct InstanceNameRec(pub [u16; MAX_INSTANCE_NAME_LEN + 1]);

impl InstanceNameRec {
    pub const EMPTY: InstanceNameRec = InstanceNameRec([0; MAX_INSTANCE_NAME_LEN + 1]);

    pub fn to_string_lossy(&self) -> String {
        wide_to_string(&self.0)
    }
}

/// Decode a NUL-terminated wide string from a fixed-size buffer.
pub fn wide_to_string(buf: &[u16]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..end])
}

/// Encode a string as a NUL-terminated wide string.
pub fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Write a string into a fixed-size wide buffer, truncating if needed.
/// A non-empty buffer always ends NUL-terminated; an empty one is left as is.
pub fn write_wide(dst: &mut [u16], s: &str) {
    if dst.is_empty() {
        return;
    }
    let mut i = 0;
    for unit in s.encode_utf16() {
        if i + 1 >= dst.len() {
            break;
        }
        dst[i] = unit;
        i += 1;
    }
    dst[i] = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_known_code_has_exactly_one_name() {
        let mut seen = std::collections::HashSet::new();
        for code in KNOWN_ERROR_CODES {
            let name = code.name().expect("known code must have a name");
            assert!(seen.insert(name), "duplicate name {name}");
            assert!(name.starts_with("LOCALDB_ERROR_"));
        }
        assert_eq!(seen.len(), KNOWN_ERROR_CODES.len());
    }

    #[test]
    fn test_unrecognized_code_has_no_name() {
        assert!(HResult(0x8000_4005_u32 as i32).name().is_none());
        assert!(HResult::OK.name().is_none());
    }

    #[test]
    fn test_hresult_success() {
        assert!(HResult::OK.is_success());
        assert!(HResult(1).is_success());
        assert!(!LOCALDB_ERROR_INSTANCE_BUSY.is_success());
    }

    #[test]
    fn test_filetime_epoch_offset() {
        // A zero FILETIME is 1601-01-01, i.e. the fixed offset itself.
        assert_eq!(filetime_to_unix_ms(Filetime::default()), FILETIME_UNIX_EPOCH_MS);
    }

    #[test]
    fn test_filetime_unix_epoch_is_zero() {
        // 11644473600 seconds of 100ns ticks lands exactly on 1970-01-01.
        let ticks = 11_644_473_600u64 * 10_000_000;
        let t = Filetime {
            low: ticks as u32,
            high: (ticks >> 32) as u32,
        };
        assert_eq!(filetime_to_unix_ms(t), 0);
    }

    #[test]
    fn test_wide_round_trip() {
        let mut buf = [0u16; 16];
        write_wide(&mut buf, "MSSQLLocalDB");
        assert_eq!(wide_to_string(&buf), "MSSQLLocalDB");
    }

    #[test]
    fn test_write_wide_truncates_and_terminates() {
        let mut buf = [0u16; 4];
        write_wide(&mut buf, "abcdef");
        assert_eq!(wide_to_string(&buf), "abc");
        assert_eq!(buf[3], 0);
    }

    #[test]
    fn test_write_wide_empty_destination_is_noop() {
        let mut buf: [u16; 0] = [];
        write_wide(&mut buf, "abc");
    }

    #[test]
    fn test_wide_to_string_without_terminator() {
        let buf: Vec<u16> = "ab".encode_utf16().collect();
        assert_eq!(wide_to_string(&buf), "ab");
    }

    #[test]
    fn test_to_wide_is_nul_terminated() {
        let wide = to_wide("x");
        assert_eq!(wide, vec![b'x' as u16, 0]);
    }

    #[test]
    fn test_record_size_field() {
        let rec = InstanceInfoRec::new();
        assert_eq!(rec.size as usize, std::mem::size_of::<InstanceInfoRec>());
    }
}
