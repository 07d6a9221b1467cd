use std::path::Path;

use anyhow::Result;
use replayhost_engine::Session;
use replayhost_types::CallProtocol;

/// Execute the `check` command: prove the module loads and honors the
/// export contract without parsing anything.
pub async fn execute(harness_path: &Path) -> Result<()> {
    let config = super::load_harness(harness_path)?;
    println!("Harness structure: OK");

    let session = Session::open(&config).await?;
    let instance = session.instance();
    let names = instance.export_names();

    println!("Module:            {}", instance.label());
    println!("Load time:         {}ms", session.module_load_ms());
    println!("Protocol:          {}", instance.protocol());
    println!(
        "Parse entry:       {}",
        match instance.protocol() {
            CallProtocol::Path => &names.parse_by_path,
            CallProtocol::Buffer => &names.parse_from_memory,
        }
    );
    println!("Memory:            {} bytes", instance.current_memory_size());
    println!(
        "Shared memory:     {}",
        if instance.has_shared_memory() { "yes" } else { "no" }
    );
    println!("Sandbox root:      {}", config.root.display());

    println!("\nAll checks passed.");
    Ok(())
}
