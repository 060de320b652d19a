//! Enumerate local instances and describe each one.
//!
//! Run on a machine with LocalDB installed:
//! `RUST_LOG=debug cargo run --example list_instances`

use localdb_core::{InstanceManager, Result};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let manager = InstanceManager::open()?;

    let names = manager.list_instance_names()?;
    if names.is_empty() {
        println!("No instances registered.");
        return Ok(());
    }

    for name in names {
        match manager.describe_instance(&name)? {
            Some(info) => {
                let json = serde_json::to_string_pretty(&info)
                    .expect("instance info serializes to JSON");
                println!("[{}] {}", name, json);
            }
            None => println!("[{}] gone", name),
        }
    }

    Ok(())
}
