//! The `prepare` command.

use std::path::Path;

use site_sync_build::bundle::{SiteManifest, prepare};
use site_sync_models::DeployConfig;

fn read(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    std::fs::read(path).map_err(|e| format!("Failed to read {}: {e}", path.display()).into())
}

/// Runs `prepare`: compiles `manifest` with `config` and writes the bundle
/// into `cache_dir`.
///
/// # Errors
///
/// * If either input cannot be read or parsed
/// * If the configuration is invalid or too many routing rules result
/// * If the bundle cannot be written
pub fn run(manifest: &Path, config: &Path, cache_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let manifest: SiteManifest = serde_json::from_slice(&read(manifest)?)?;
    let config: DeployConfig = serde_json::from_slice(&read(config)?)?;

    let bundle = prepare(config, &manifest)?;
    bundle.write(cache_dir)?;

    log::info!(
        "Prepared {} routing rule(s), {} redirect object(s), {} parameter rule(s)",
        bundle.routing_rules.len(),
        bundle.redirect_objects.len(),
        bundle.params.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use site_sync_build::bundle::Bundle;

    use super::*;

    #[test]
    fn writes_a_loadable_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        let config = dir.path().join("config.json");
        std::fs::write(
            &manifest,
            r#"{
                "redirects": [{"fromPath": "/old/", "toPath": "/new/", "isPermanent": false}],
                "pages": [{"path": "/app/", "matchPath": "/app/*"}]
            }"#,
        )
        .unwrap();
        std::fs::write(&config, r#"{"bucketName": "site"}"#).unwrap();

        let cache_dir = dir.path().join(".cache");
        run(&manifest, &config, &cache_dir).unwrap();

        let bundle = Bundle::load(&cache_dir).unwrap();
        assert_eq!(bundle.config.bucket_name, "site");
        assert_eq!(bundle.routing_rules.len(), 2);
        assert!(bundle.redirect_objects.is_empty());
    }

    #[test]
    fn invalid_config_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        let config = dir.path().join("config.json");
        std::fs::write(&manifest, "{}").unwrap();
        std::fs::write(&config, r#"{"protocol": "https"}"#).unwrap();

        let cache_dir = dir.path().join(".cache");
        assert!(run(&manifest, &config, &cache_dir).is_err());
        assert!(!cache_dir.exists());
    }
}
