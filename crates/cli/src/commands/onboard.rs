//! `parley onboard`: first-time setup.

use parley_config::AppConfig;
use std::path::Path;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Parley: First-Time Setup");
    println!("========================\n");

    if write_default_config(&config_dir, &config_path)? {
        println!("Created config.toml at: {}", config_path.display());
        println!("\nNext steps:");
        println!("   1. Export a provider key, e.g. OPENAI_API_KEY or GEMINI_API_KEY");
        println!("   2. Add a bearer token under [gateway.api_tokens]");
        println!("   3. Run: parley serve\n");
    } else {
        println!("Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    }

    println!("Setup complete! Try `parley chat -m \"hello\"`.\n");

    Ok(())
}

/// Write the default config unless one exists. Returns whether it wrote.
fn write_default_config(config_dir: &Path, config_path: &Path) -> std::io::Result<bool> {
    std::fs::create_dir_all(config_dir)?;
    if config_path.exists() {
        return Ok(false);
    }
    std::fs::write(config_path, AppConfig::default_toml())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_loadable_config_once() {
        let dir = std::env::temp_dir().join(format!("parley-onboard-{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = std::fs::remove_file(&path);

        assert!(write_default_config(&dir, &path).unwrap());
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.providers.len(), AppConfig::default().providers.len());

        std::fs::write(&path, "# edited").unwrap();
        assert!(!write_default_config(&dir, &path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# edited");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
