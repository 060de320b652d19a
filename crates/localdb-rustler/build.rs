fn main() {
    // NIF symbols (_enif_*) resolve at runtime when the BEAM VM loads this
    // shared library, but macOS's linker rejects unresolved symbols by
    // default, so allow them there.
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "macos" {
        println!("cargo:rustc-link-arg=-undefined");
        println!("cargo:rustc-link-arg=dynamic_lookup");
    }
}
