use std::collections::HashMap;

use serde::Deserialize;

/// One entry of `/versions/loader/{mc}` on the Fabric and Quilt meta services.
#[derive(Debug, Clone, Deserialize)]
pub struct LoaderVersionEntry {
    pub loader: LoaderBuild,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoaderBuild {
    pub version: String,
    #[serde(default)]
    pub stable: Option<bool>,
}

/// Forge `promotions_slim.json`: keys look like `1.20.1-recommended`.
#[derive(Debug, Clone, Deserialize)]
pub struct ForgePromotions {
    pub promos: HashMap<String, String>,
}

impl ForgePromotions {
    /// Recommended build for `base_version`, else the latest one.
    pub fn pick(&self, base_version: &str) -> Option<&str> {
        self.promos
            .get(&format!("{base_version}-recommended"))
            .or_else(|| self.promos.get(&format!("{base_version}-latest")))
            .map(String::as_str)
    }
}

/// NeoForge maven API listing, oldest first.
#[derive(Debug, Clone, Deserialize)]
pub struct NeoForgeVersions {
    pub versions: Vec<String>,
}

impl NeoForgeVersions {
    /// Newest stable build whose version starts with `prefix`, falling back to
    /// the newest pre-release when no stable one exists.
    pub fn newest_with_prefix(&self, prefix: &str) -> Option<&str> {
        let mut matching = self.versions.iter().rev().filter(|v| v.starts_with(prefix));
        let newest = matching.clone().next();
        matching
            .find(|v| !v.contains('-'))
            .or(newest)
            .map(String::as_str)
    }
}
