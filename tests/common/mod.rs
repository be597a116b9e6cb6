#![allow(dead_code)]

use std::{path::Path, sync::Arc, time::Duration};

use mineloom::{
    InstallManager, InstanceConfig, Settings, TaskRegistry,
    content::ContentCache,
    instance::InstanceStore,
    registry::{RegistryClient, RegistryEndpoints},
};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub fn init_tracing() {
    _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn settings(server: &MockServer) -> Settings {
    Settings {
        endpoints: RegistryEndpoints::mirrored(&server.uri()),
        request_timeout_secs: 5,
        ..Settings::default()
    }
}

pub fn manager(root: &Path, settings: Settings) -> InstallManager {
    let client = RegistryClient::new(settings.endpoints.clone(), Duration::from_secs(5)).unwrap();
    InstallManager::with_parts(
        InstanceStore::new(root.join("instances")),
        Arc::new(TaskRegistry::new()),
        client,
        ContentCache::in_memory(),
        settings,
    )
}

/// Version manifest, descriptor (one library) and client jar for `version`.
pub async fn mount_base(server: &MockServer, version: &str) {
    let uri = server.uri();
    Mock::given(method("GET"))
        .and(path("/mc/game/version_manifest_v2.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "latest": { "release": version, "snapshot": version },
            "versions": [{ "id": version, "type": "release", "url": format!("{uri}/v1/{version}.json") }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/{version}.json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": version,
            "downloads": { "client": { "url": format!("{uri}/v1/{version}.jar") } },
            "libraries": [{ "name": "org.ow2.asm:asm:9.6" }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/{version}.jar")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"client".to_vec()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/libraries/org/ow2/asm/asm/9.6/asm-9.6.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"asm".to_vec()))
        .mount(server)
        .await;
}

/// Fabric meta listing `loader` as the newest build plus its profile.
pub async fn mount_fabric(server: &MockServer, version: &str, loader: &str) {
    let uri = server.uri();
    Mock::given(method("GET"))
        .and(path(format!("/fabric/v2/versions/loader/{version}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "loader": { "version": loader, "stable": true } },
            { "loader": { "version": "0.14.0", "stable": true } }
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/fabric/v2/versions/loader/{version}/{loader}/profile/json"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": format!("fabric-loader-{loader}-{version}"),
            "inheritsFrom": version,
            "libraries": [
                { "name": format!("net.fabricmc:fabric-loader:{loader}"), "url": format!("{uri}/fabric-maven/") }
            ]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/fabric-maven/net/fabricmc/fabric-loader/{loader}/fabric-loader-{loader}.jar"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"loader".to_vec()))
        .mount(server)
        .await;
}

/// Writes base version files so the base download phase has nothing to do.
pub fn seed_base(manager: &InstallManager, name: &str, version: &str) {
    let paths = manager.store().paths(name);
    std::fs::create_dir_all(paths.version_dir(version)).unwrap();
    std::fs::write(
        paths.version_json(version),
        json!({ "id": version, "libraries": [] }).to_string(),
    )
    .unwrap();
    std::fs::write(paths.version_jar(version), b"client").unwrap();
}

pub async fn create_record(manager: &InstallManager, config: InstanceConfig) -> InstanceConfig {
    manager.store().create(config).await.unwrap()
}
