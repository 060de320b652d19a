//! Rustler NIFs for localdb-core.
//!
//! This crate exposes the four LocalDB instance operations to Elixir/Erlang
//! via Rustler NIFs. Every NIF is scheduled on a dirty IO scheduler because
//! the native layer blocks: a stop waits up to its timeout, a start waits
//! for the engine process to come up.
//!
//! # Usage in Elixir
//!
//! ```elixir
//! defmodule LocalDb.Native do
//!   use Rustler, otp_app: :localdb, crate: "localdb_rustler"
//!
//!   def describe_instance(_name), do: :erlang.nif_error(:nif_not_loaded)
//!   def start_instance(_name), do: :erlang.nif_error(:nif_not_loaded)
//!   def stop_instance(_name, _options \\ %{}), do: :erlang.nif_error(:nif_not_loaded)
//!   def list_instance_names(), do: :erlang.nif_error(:nif_not_loaded)
//! end
//! ```

use std::sync::OnceLock;

use localdb_core::{InstanceManager, LocalDbError, NativeLibrary, StopOptions};
use rustler::types::atom::Atom;
use rustler::{Encoder, Error, NifResult, NifStruct, Term};

mod atoms {
    rustler::atoms! {
        ok,
        timeout,
        kill,
        no_wait,
    }
}

// ============================================================================
// NIF Structs
// ============================================================================

/// Instance description as an Elixir struct.
///
/// `nil` fields follow the presence rules of the core type: `shared_name`
/// and `connection_string` only when non-blank; `version`, `last_started`
/// and `owner_sid` only when the instance exists on disk.
#[derive(NifStruct)]
#[module = "LocalDb.InstanceInfo"]
pub struct ElixirInstanceInfo {
    pub name: String,
    pub shared_name: Option<String>,
    pub connection_string: Option<String>,
    pub running: bool,
    pub automatic: bool,
    pub exists: bool,
    pub corrupted: bool,
    pub version: Option<String>,
    pub last_started: Option<i64>,
    pub owner_sid: Option<String>,
}

impl From<localdb_core::InstanceInfo> for ElixirInstanceInfo {
    fn from(info: localdb_core::InstanceInfo) -> Self {
        Self {
            name: info.name,
            shared_name: info.shared_name,
            connection_string: info.connection_string,
            running: info.running,
            automatic: info.automatic,
            exists: info.exists,
            corrupted: info.corrupted,
            version: info.version,
            last_started: info.last_started,
            owner_sid: info.owner_sid,
        }
    }
}

// ============================================================================
// Native library handle
// ============================================================================

/// The vendor library is loaded once per VM; every NIF call goes through
/// this shared manager. A failed load is remembered and re-reported.
fn manager() -> NifResult<&'static InstanceManager<NativeLibrary>> {
    static MANAGER: OnceLock<Result<InstanceManager<NativeLibrary>, String>> = OnceLock::new();
    MANAGER
        .get_or_init(|| {
            NativeLibrary::open()
                .map(InstanceManager::new)
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|message| Error::Term(Box::new(message.clone())))
}

// ============================================================================
// Term decoding
// ============================================================================

fn to_nif_error(err: LocalDbError) -> Error {
    Error::Term(Box::new(err.to_string()))
}

/// Decode and fully validate the name argument.
///
/// Runs before anything else in every NIF — before options decoding and
/// before the vendor library is opened — so a bad name always reports as a
/// name error, even on hosts where LocalDB is absent.
fn decode_name(term: Term) -> NifResult<String> {
    let name = term
        .decode::<String>()
        .map_err(|_| Error::Term(Box::new("expected an instance name".to_string())))?;
    localdb_core::validate_instance_name(&name).map_err(to_nif_error)?;
    Ok(name)
}

fn is_nil(term: Term) -> bool {
    term.is_atom() && term.atom_to_string().map(|s| s == "nil").unwrap_or(false)
}

/// Elixir truthiness: everything except `false` and `nil` is true.
fn truthy(term: Term) -> bool {
    match term.decode::<bool>() {
        Ok(value) => value,
        Err(_) => !is_nil(term),
    }
}

fn number(term: Term) -> Option<f64> {
    term.decode::<f64>()
        .ok()
        .or_else(|| term.decode::<i64>().ok().map(|v| v as f64))
}

/// Decode the optional stop-options map.
///
/// `nil` means no options. A present key with a `nil` value counts as
/// absent, which matters for the kill/no_wait precedence resolved in core.
fn decode_stop_options(term: Term) -> NifResult<StopOptions> {
    if is_nil(term) {
        return Ok(StopOptions::default());
    }
    if !term.is_map() {
        return Err(Error::Term(Box::new("options not an object".to_string())));
    }

    let env = term.get_env();
    let mut options = StopOptions::default();

    if let Ok(value) = term.map_get(atoms::timeout().encode(env)) {
        if !is_nil(value) {
            match number(value) {
                Some(secs) => options.timeout = Some(secs),
                None => {
                    return Err(Error::Term(Box::new("timeout not a number".to_string())));
                }
            }
        }
    }
    if let Ok(value) = term.map_get(atoms::kill().encode(env)) {
        if !is_nil(value) {
            options.kill = Some(truthy(value));
        }
    }
    if let Ok(value) = term.map_get(atoms::no_wait().encode(env)) {
        if !is_nil(value) {
            options.no_wait = Some(truthy(value));
        }
    }
    Ok(options)
}

// ============================================================================
// NIF Functions
// ============================================================================

/// Describe a named instance; `nil` when it neither exists nor is automatic.
#[rustler::nif(schedule = "DirtyIo")]
fn describe_instance(name: Term) -> NifResult<Option<ElixirInstanceInfo>> {
    let name = decode_name(name)?;
    manager()?
        .describe_instance(&name)
        .map(|info| info.map(ElixirInstanceInfo::from))
        .map_err(to_nif_error)
}

/// Start a named instance and return its connection string.
#[rustler::nif(schedule = "DirtyIo")]
fn start_instance(name: Term) -> NifResult<String> {
    let name = decode_name(name)?;
    manager()?.start_instance(&name).map_err(to_nif_error)
}

/// Stop a named instance. Blocks for up to the resolved timeout.
#[rustler::nif(schedule = "DirtyIo")]
fn stop_instance(name: Term, options: Term) -> NifResult<Atom> {
    let name = decode_name(name)?;
    let options = decode_stop_options(options)?;
    manager()?
        .stop_instance(&name, &options)
        .map_err(to_nif_error)?;
    Ok(atoms::ok())
}

/// Enumerate registered instance names.
#[rustler::nif(schedule = "DirtyIo")]
fn list_instance_names() -> NifResult<Vec<String>> {
    manager()?.list_instance_names().map_err(to_nif_error)
}

// ============================================================================
// Rustler Init
// ============================================================================

rustler::init!("Elixir.LocalDb.Native");

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> localdb_core::InstanceInfo {
        localdb_core::InstanceInfo {
            name: "MSSQLLocalDB".into(),
            shared_name: None,
            connection_string: Some(r"np:\\.\pipe\LOCALDB#0001\tsql\query".into()),
            running: true,
            automatic: true,
            exists: true,
            corrupted: false,
            version: Some("15.0.2000.5".into()),
            last_started: Some(1_609_459_200_000),
            owner_sid: Some("S-1-5-21-42-42-42-500".into()),
        }
    }

    #[test]
    fn test_struct_conversion_preserves_presence() {
        let info = ElixirInstanceInfo::from(sample_info());
        assert_eq!(info.name, "MSSQLLocalDB");
        assert_eq!(info.shared_name, None);
        assert_eq!(info.version.as_deref(), Some("15.0.2000.5"));
        assert_eq!(info.last_started, Some(1_609_459_200_000));
        assert!(info.running && info.automatic && info.exists);
        assert!(!info.corrupted);
    }
}
