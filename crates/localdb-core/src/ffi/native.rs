//! Discovery and loading of the vendor instance API library.
//!
//! # Platform Behavior
//! - **Windows**: the registry lists one instance API DLL per installed
//!   LocalDB version; the newest one is loaded and its four entry points
//!   resolved. This mirrors what the vendor's own proxy layer does.
//! - **Other platforms**: LocalDB does not exist; [`NativeLibrary::open`]
//!   reports not-installed.

#[cfg(windows)]
pub use self::windows::NativeLibrary;
#[cfg(not(windows))]
pub use self::unsupported::NativeLibrary;

#[cfg(windows)]
mod windows {
    #![allow(unsafe_code)] // Owns the FFI boundary to the vendor DLL and the registry.

    use std::path::PathBuf;
    use std::ptr;

    use libloading::Library;
    use tracing::debug;
    use windows_sys::Win32::Foundation::ERROR_SUCCESS;
    use windows_sys::Win32::System::Registry::{
        RegCloseKey, RegEnumKeyExW, RegGetValueW, RegOpenKeyExW, HKEY, HKEY_LOCAL_MACHINE,
        KEY_READ, RRF_RT_REG_SZ,
    };

    use crate::error::{LocalDbError, Result};
    use crate::ffi::{self, HResult, InstanceInfoRec, InstanceNameRec};
    use crate::instances::InstanceApi;

    const INSTALLED_VERSIONS_KEY: &str =
        r"SOFTWARE\Microsoft\Microsoft SQL Server Local DB\Installed Versions";
    const INSTANCE_API_PATH_VALUE: &str = "InstanceAPIPath";

    type GetInstanceInfoFn =
        unsafe extern "system" fn(*const u16, *mut InstanceInfoRec, u32) -> i32;
    type StartInstanceFn =
        unsafe extern "system" fn(*const u16, u32, *mut u16, *mut u32) -> i32;
    type StopInstanceFn = unsafe extern "system" fn(*const u16, u32, u32) -> i32;
    type GetInstancesFn = unsafe extern "system" fn(*mut InstanceNameRec, *mut u32) -> i32;

    /// The loaded vendor instance API.
    pub struct NativeLibrary {
        get_instance_info: GetInstanceInfoFn,
        start_instance: StartInstanceFn,
        stop_instance: StopInstanceFn,
        get_instances: GetInstancesFn,
        /// Keeps the DLL mapped for as long as the resolved entry points live.
        _library: Library,
    }

    impl NativeLibrary {
        /// Locate the newest installed instance API DLL and resolve its
        /// entry points.
        pub fn open() -> Result<Self> {
            let path = instance_api_path()?;
            debug!("Loading LocalDB instance API from {}", path.display());

            // SAFETY: the path comes from the vendor's own registration; the
            // DLL's initialization has no preconditions we must uphold.
            let library = unsafe { Library::new(&path) }
                .map_err(|e| LocalDbError::Library(format!("{}: {}", path.display(), e)))?;

            // SAFETY: signatures match the vendor header declarations. The
            // raw fn pointers are copied out of their symbols while `library`
            // stays alive in the returned struct.
            unsafe {
                let get_instance_info =
                    *resolve::<GetInstanceInfoFn>(&library, b"LocalDBGetInstanceInfo\0")?;
                let start_instance =
                    *resolve::<StartInstanceFn>(&library, b"LocalDBStartInstance\0")?;
                let stop_instance =
                    *resolve::<StopInstanceFn>(&library, b"LocalDBStopInstance\0")?;
                let get_instances =
                    *resolve::<GetInstancesFn>(&library, b"LocalDBGetInstances\0")?;
                Ok(Self {
                    get_instance_info,
                    start_instance,
                    stop_instance,
                    get_instances,
                    _library: library,
                })
            }
        }
    }

    unsafe fn resolve<'lib, T>(
        library: &'lib Library,
        symbol: &[u8],
    ) -> Result<libloading::Symbol<'lib, T>> {
        // SAFETY: the caller guarantees `T` matches the exported signature.
        unsafe { library.get::<T>(symbol) }.map_err(|e| {
            LocalDbError::Library(format!(
                "missing entry point {}: {}",
                String::from_utf8_lossy(&symbol[..symbol.len() - 1]),
                e
            ))
        })
    }

    impl InstanceApi for NativeLibrary {
        fn get_instance_info(&self, name: &[u16], info: &mut InstanceInfoRec) -> HResult {
            // SAFETY: `name` is NUL-terminated by the caller; `info` is a
            // writable record whose size field describes its full extent.
            HResult(unsafe { (self.get_instance_info)(name.as_ptr(), info, info.size) })
        }

        fn start_instance(
            &self,
            name: &[u16],
            flags: u32,
            connection: &mut [u16],
            len: &mut u32,
        ) -> HResult {
            // SAFETY: `connection` holds at least `*len` code units.
            HResult(unsafe {
                (self.start_instance)(name.as_ptr(), flags, connection.as_mut_ptr(), len)
            })
        }

        fn stop_instance(&self, name: &[u16], flags: u32, timeout_secs: u32) -> HResult {
            // SAFETY: `name` is NUL-terminated by the caller.
            HResult(unsafe { (self.stop_instance)(name.as_ptr(), flags, timeout_secs) })
        }

        fn instance_names(
            &self,
            names: Option<&mut [InstanceNameRec]>,
            count: &mut u32,
        ) -> HResult {
            let ptr = names.map_or(ptr::null_mut(), |slots| slots.as_mut_ptr());
            // SAFETY: `ptr` is either null (probe) or points at `*count`
            // name slots.
            HResult(unsafe { (self.get_instances)(ptr, count) })
        }
    }

    /// Path of the instance API DLL for the newest installed version.
    fn instance_api_path() -> Result<PathBuf> {
        let versions = RegKey::open(HKEY_LOCAL_MACHINE, INSTALLED_VERSIONS_KEY)
            .ok_or(LocalDbError::NotInstalled)?;

        let newest = versions
            .subkeys()
            .into_iter()
            .filter_map(|name| parse_version(&name).map(|v| (v, name)))
            .max()
            .map(|(_, name)| name)
            .ok_or(LocalDbError::NotInstalled)?;
        debug!("Newest installed LocalDB version: {}", newest);

        let version_key = RegKey::open(
            HKEY_LOCAL_MACHINE,
            &format!(r"{INSTALLED_VERSIONS_KEY}\{newest}"),
        )
        .ok_or(LocalDbError::NotInstalled)?;
        let path = version_key.string_value(INSTANCE_API_PATH_VALUE)?;
        Ok(PathBuf::from(path))
    }

    fn parse_version(name: &str) -> Option<(u32, u32)> {
        let mut parts = name.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Some((major, minor))
    }

    /// Minimal RAII handle over a read-only registry key.
    struct RegKey(HKEY);

    impl RegKey {
        fn open(root: HKEY, path: &str) -> Option<Self> {
            let wide = ffi::to_wide(path);
            let mut handle: HKEY = ptr::null_mut();
            // SAFETY: `wide` is NUL-terminated and outlives the call;
            // `handle` is a valid out pointer.
            let status = unsafe { RegOpenKeyExW(root, wide.as_ptr(), 0, KEY_READ, &mut handle) };
            (status == ERROR_SUCCESS).then(|| Self(handle))
        }

        fn subkeys(&self) -> Vec<String> {
            let mut names = Vec::new();
            let mut index = 0u32;
            loop {
                let mut buf = [0u16; 256];
                let mut len = buf.len() as u32;
                // SAFETY: `buf` and `len` describe the same allocation; the
                // optional out parameters are unused and passed as null.
                let status = unsafe {
                    RegEnumKeyExW(
                        self.0,
                        index,
                        buf.as_mut_ptr(),
                        &mut len,
                        ptr::null_mut(),
                        ptr::null_mut(),
                        ptr::null_mut(),
                        ptr::null_mut(),
                    )
                };
                if status != ERROR_SUCCESS {
                    break;
                }
                names.push(String::from_utf16_lossy(&buf[..len as usize]));
                index += 1;
            }
            names
        }

        fn string_value(&self, name: &str) -> Result<String> {
            let wide = ffi::to_wide(name);
            let mut bytes = 0u32;
            // SAFETY: probing with a null data pointer yields the required
            // byte length.
            let status = unsafe {
                RegGetValueW(
                    self.0,
                    ptr::null(),
                    wide.as_ptr(),
                    RRF_RT_REG_SZ,
                    ptr::null_mut(),
                    ptr::null_mut(),
                    &mut bytes,
                )
            };
            if status != ERROR_SUCCESS {
                return Err(LocalDbError::Library(format!(
                    "registry value {name} is missing"
                )));
            }

            let mut buf = vec![0u16; (bytes as usize).div_ceil(2)];
            // SAFETY: `buf` holds at least `bytes` bytes.
            let status = unsafe {
                RegGetValueW(
                    self.0,
                    ptr::null(),
                    wide.as_ptr(),
                    RRF_RT_REG_SZ,
                    ptr::null_mut(),
                    buf.as_mut_ptr().cast(),
                    &mut bytes,
                )
            };
            if status != ERROR_SUCCESS {
                return Err(LocalDbError::Library(format!(
                    "registry value {name} could not be read"
                )));
            }
            Ok(ffi::wide_to_string(&buf))
        }
    }

    impl Drop for RegKey {
        fn drop(&mut self) {
            // SAFETY: the handle was opened by `RegOpenKeyExW` and is closed
            // exactly once.
            unsafe {
                RegCloseKey(self.0);
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::parse_version;

        #[test]
        fn test_parse_version() {
            assert_eq!(parse_version("15.0"), Some((15, 0)));
            assert_eq!(parse_version("11.0.40"), Some((11, 0)));
            assert_eq!(parse_version("13"), Some((13, 0)));
            assert_eq!(parse_version("not-a-version"), None);
        }

        #[test]
        fn test_version_ordering_prefers_newest() {
            let mut versions = vec![(11u32, 0u32), (15, 0), (13, 1)];
            versions.sort();
            assert_eq!(versions.last(), Some(&(15, 0)));
        }
    }
}

#[cfg(not(windows))]
mod unsupported {
    use crate::error::{LocalDbError, Result};
    use crate::ffi::{self, HResult, InstanceInfoRec, InstanceNameRec};
    use crate::instances::InstanceApi;

    /// Stub for platforms without the vendor instance API.
    ///
    /// [`NativeLibrary::open`] always reports not-installed, so the
    /// `InstanceApi` impl below exists only to keep dependents compiling.
    pub struct NativeLibrary;

    impl NativeLibrary {
        pub fn open() -> Result<Self> {
            Err(LocalDbError::NotInstalled)
        }
    }

    impl InstanceApi for NativeLibrary {
        fn get_instance_info(&self, _name: &[u16], _info: &mut InstanceInfoRec) -> HResult {
            ffi::LOCALDB_ERROR_NOT_INSTALLED
        }

        fn start_instance(
            &self,
            _name: &[u16],
            _flags: u32,
            _connection: &mut [u16],
            _len: &mut u32,
        ) -> HResult {
            ffi::LOCALDB_ERROR_NOT_INSTALLED
        }

        fn stop_instance(&self, _name: &[u16], _flags: u32, _timeout_secs: u32) -> HResult {
            ffi::LOCALDB_ERROR_NOT_INSTALLED
        }

        fn instance_names(
            &self,
            _names: Option<&mut [InstanceNameRec]>,
            _count: &mut u32,
        ) -> HResult {
            ffi::LOCALDB_ERROR_NOT_INSTALLED
        }
    }
}
