use anyhow::Result;
use engine::{AnalysisConfig, RuntimeKind, RuntimeProfileRegistry};

pub fn run() -> Result<()> {
    // A missing or invalid configuration still lists the full table.
    let disabled = AnalysisConfig::load(&AnalysisConfig::manager())
        .map(|config| config.disabled_runtimes)
        .unwrap_or_default();
    let registry = RuntimeProfileRegistry::standard().without(&disabled);

    println!("{:<12} {:<18} COMMAND", "TYPE", "EXTENSIONS");
    for kind in RuntimeKind::ALL {
        let extensions = registry.extensions().extensions_for(kind).join(" ");
        let command = match registry.profile(kind) {
            Ok(profile) => profile.run_command.join(" "),
            Err(_) => "(disabled)".to_string(),
        };
        println!("{:<12} {:<18} {}", kind.as_str(), extensions, command);
    }
    Ok(())
}
