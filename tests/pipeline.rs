mod common;

use std::time::Duration;

use mineloom::{
    InstallError, InstallOutcome, InstanceConfig, InstanceStatus, LoaderFamily, StoreError,
    config::{EventPayload, InstallEvent},
    instance::ContentKind,
};
use serde_json::json;
use tokio::sync::broadcast;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, path_regex},
};

use common::*;

fn drain(rx: &mut broadcast::Receiver<InstallEvent>) -> Vec<InstallEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn percents(events: &[InstallEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn fabric_install_reaches_ready() {
    init_tracing();
    let server = MockServer::start().await;
    mount_base(&server, "1.20.1").await;
    mount_fabric(&server, "1.20.1", "0.15.7").await;

    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), settings(&server));
    let mut rx = manager.receiver();

    let handle = manager
        .create_instance(InstanceConfig::new("Fabric Test", "1.20.1", LoaderFamily::Fabric))
        .await
        .unwrap();
    let name = handle.instance().to_string();
    assert_eq!(handle.wait().await, InstallOutcome::Ready);

    let config = manager.store().load(&name).await.unwrap();
    assert_eq!(config.status, InstanceStatus::Ready);
    assert_eq!(config.loader_version.as_deref(), Some("0.15.7"));
    assert_eq!(
        config.version_id.as_deref(),
        Some("fabric-loader-0.15.7-1.20.1")
    );
    assert!(config.error.is_none());

    let paths = manager.store().paths(&name);
    assert!(paths.version_json("fabric-loader-0.15.7-1.20.1").is_file());
    assert!(paths.version_jar("1.20.1").is_file());
    assert!(
        paths
            .libraries_dir()
            .join("org/ow2/asm/asm/9.6/asm-9.6.jar")
            .is_file()
    );
    assert!(
        paths
            .libraries_dir()
            .join("net/fabricmc/fabric-loader/0.15.7/fabric-loader-0.15.7.jar")
            .is_file()
    );
    assert!(manager.tasks().is_empty());

    let log = std::fs::read_to_string(paths.install_log()).unwrap();
    assert!(log.lines().all(|line| line.starts_with('[')));
    assert!(log.contains("Installation complete"));

    let events = drain(&mut rx);
    let seen = percents(&events);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert_eq!(seen.last(), Some(&100));
    assert_eq!(seen.iter().filter(|p| **p == 100).count(), 1);
    assert!(events.iter().any(|e| matches!(
        &e.payload,
        EventPayload::StatusChange { status: InstanceStatus::Ready, error: None }
    )));
}

#[tokio::test]
async fn unknown_base_version_ends_in_error() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mc/game/version_manifest_v2.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "versions": [] })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), settings(&server));
    let handle = manager
        .create_instance(InstanceConfig::new("ghost", "9.9.9", LoaderFamily::None))
        .await
        .unwrap();

    let outcome = handle.wait().await;
    assert!(matches!(&outcome, InstallOutcome::Failed(msg) if msg.contains("9.9.9")));

    let config = manager.store().load("ghost").await.unwrap();
    assert_eq!(config.status, InstanceStatus::Error);
    assert!(config.error.unwrap().contains("9.9.9"));
    assert!(manager.tasks().is_empty());
}

#[tokio::test]
async fn migration_removes_unknown_content() {
    init_tracing();
    let server = MockServer::start().await;
    mount_fabric(&server, "1.20.1", "0.15.7").await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/modrinth/v2/version_file/[0-9a-f]+$"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), settings(&server));
    let config = create_record(
        &manager,
        InstanceConfig::new("migrating", "1.19.4", LoaderFamily::Fabric),
    )
    .await;
    seed_base(&manager, "migrating", "1.20.1");

    let paths = manager.store().paths("migrating");
    let mods = paths.content_dir(ContentKind::Mod);
    std::fs::create_dir_all(&mods).unwrap();
    std::fs::write(mods.join("mystery.jar"), b"not on any registry").unwrap();

    let target = InstanceConfig {
        version: "1.20.1".into(),
        ..config
    };
    let handle = manager
        .start_install("migrating", target, false, true)
        .await
        .unwrap();
    assert_eq!(handle.wait().await, InstallOutcome::Ready);

    assert!(!mods.join("mystery.jar").exists());
    let config = manager.store().load("migrating").await.unwrap();
    assert_eq!(config.status, InstanceStatus::Ready);
    assert_eq!(config.version, "1.20.1");

    let log = std::fs::read_to_string(paths.install_log()).unwrap();
    assert!(log.contains("Removing mystery.jar"));
    assert!(log.contains("0 to replace"));
}

/// Modrinth knows the installed lithium build and offers `lithium-0.11.2.jar`
/// as its replacement, advertised with `size` bytes.
async fn mount_lithium_upgrade(server: &MockServer, size: u64) {
    let uri = server.uri();
    Mock::given(method("GET"))
        .and(path_regex(r"^/modrinth/v2/version_file/[0-9a-f]+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "lithium-old",
            "project_id": "gvQqBUqZ",
            "files": []
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/modrinth/v2/project/gvQqBUqZ/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "lithium-new",
            "project_id": "gvQqBUqZ",
            "files": [{
                "url": format!("{uri}/cdn/lithium-0.11.2.jar"),
                "filename": "lithium-0.11.2.jar",
                "primary": true,
                "size": size,
                "hashes": { "sha512": "abc" }
            }]
        }])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/modrinth/v2/project/gvQqBUqZ"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "gvQqBUqZ",
            "slug": "lithium",
            "title": "Lithium"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/lithium-0.11.2.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"lithium".to_vec()))
        .expect(1)
        .mount(server)
        .await;
}

/// Runs a 1.19.4 to 1.20.1 migration of an instance holding one old lithium
/// jar. Returns the mods directory.
async fn migrate_lithium(server: &MockServer, root: &std::path::Path, name: &str) -> std::path::PathBuf {
    let manager = manager(root, settings(server));
    let config = create_record(
        &manager,
        InstanceConfig::new(name, "1.19.4", LoaderFamily::Fabric),
    )
    .await;
    seed_base(&manager, name, "1.20.1");

    let mods = manager.store().paths(name).content_dir(ContentKind::Mod);
    std::fs::create_dir_all(&mods).unwrap();
    std::fs::write(mods.join("lithium-0.10.0.jar"), b"old lithium").unwrap();

    let target = InstanceConfig {
        version: "1.20.1".into(),
        ..config
    };
    let handle = manager
        .start_install(name, target, false, true)
        .await
        .unwrap();
    assert_eq!(handle.wait().await, InstallOutcome::Ready);
    mods
}

#[tokio::test]
async fn migration_replaces_outdated_mods() {
    init_tracing();
    let server = MockServer::start().await;
    mount_fabric(&server, "1.20.1", "0.15.7").await;
    mount_lithium_upgrade(&server, 7).await;

    let dir = tempfile::tempdir().unwrap();
    let mods = migrate_lithium(&server, dir.path(), "upgrade").await;

    assert!(!mods.join("lithium-0.10.0.jar").exists());
    assert_eq!(
        std::fs::read(mods.join("lithium-0.11.2.jar")).unwrap(),
        b"lithium"
    );
}

#[tokio::test]
async fn replacement_with_wrong_size_is_discarded() {
    init_tracing();
    let server = MockServer::start().await;
    mount_fabric(&server, "1.20.1", "0.15.7").await;
    mount_lithium_upgrade(&server, 4096).await;

    let dir = tempfile::tempdir().unwrap();
    let mods = migrate_lithium(&server, dir.path(), "truncated").await;

    assert!(!mods.join("lithium-0.10.0.jar").exists());
    assert!(!mods.join("lithium-0.11.2.jar").exists());
    let log = std::fs::read_to_string(mods.parent().unwrap().join("install.log")).unwrap();
    assert!(log.contains("Discarded lithium-0.11.2.jar: got 7 bytes, expected 4096"));
    assert!(log.contains("Migrated content: 0/1 installed"));
}

#[tokio::test]
async fn second_start_preempts_the_first() {
    init_tracing();
    let server = MockServer::start().await;
    mount_base(&server, "1.20.1").await;
    Mock::given(method("GET"))
        .and(path("/fabric/v2/versions/loader/1.20.1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "loader": { "version": "0.15.7", "stable": true } }]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    mount_fabric(&server, "1.20.1", "0.15.7").await;

    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), settings(&server));
    let config = create_record(
        &manager,
        InstanceConfig::new("twice", "1.20.1", LoaderFamily::Fabric),
    )
    .await;

    let first = manager
        .start_install("twice", config.clone(), false, false)
        .await
        .unwrap();
    let second = manager
        .start_install("twice", config, false, false)
        .await
        .unwrap();

    assert!(first.task().is_aborted());
    assert_eq!(first.wait().await, InstallOutcome::Stopped);
    assert_eq!(second.wait().await, InstallOutcome::Ready);
    assert!(manager.tasks().is_empty());

    let stored = manager.store().load("twice").await.unwrap();
    assert_eq!(stored.status, InstanceStatus::Ready);
    assert_eq!(stored.version_id.as_deref(), Some("fabric-loader-0.15.7-1.20.1"));
    assert!(stored.error.is_none());
}

#[tokio::test]
async fn preempted_failure_leaves_the_successor_status() {
    init_tracing();
    let server = MockServer::start().await;
    // the first task fails, but only after it was preempted
    Mock::given(method("GET"))
        .and(path("/fabric/v2/versions/loader/1.20.1"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/quilt/v3/versions/loader/1.20.1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "loader": { "version": "0.23.1", "stable": true } }]))
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/quilt/v3/versions/loader/1.20.1/0.23.1/profile/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "quilt-loader-0.23.1-1.20.1",
            "inheritsFrom": "1.20.1",
            "libraries": []
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), settings(&server));
    let config = create_record(
        &manager,
        InstanceConfig::new("swap", "1.20.1", LoaderFamily::Fabric),
    )
    .await;
    seed_base(&manager, "swap", "1.20.1");

    let first = manager
        .start_install("swap", config.clone(), false, false)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = manager
        .start_install(
            "swap",
            InstanceConfig {
                loader: LoaderFamily::Quilt,
                ..config
            },
            false,
            false,
        )
        .await
        .unwrap();

    assert_eq!(first.wait().await, InstallOutcome::Stopped);
    assert!(manager.tasks().is_active("swap"));
    let stored = manager.store().load("swap").await.unwrap();
    assert_eq!(stored.status, InstanceStatus::Installing);
    assert_eq!(stored.loader, LoaderFamily::Quilt);
    assert!(stored.error.is_none());

    assert_eq!(second.wait().await, InstallOutcome::Ready);
    let stored = manager.store().load("swap").await.unwrap();
    assert_eq!(stored.status, InstanceStatus::Ready);
    assert_eq!(stored.version_id.as_deref(), Some("quilt-loader-0.23.1-1.20.1"));
}

#[tokio::test]
async fn cancelled_failure_stays_stopped() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fabric/v2/versions/loader/1.20.1"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), settings(&server));
    let mut rx = manager.receiver();
    let config = create_record(
        &manager,
        InstanceConfig::new("halt", "1.20.1", LoaderFamily::Fabric),
    )
    .await;
    seed_base(&manager, "halt", "1.20.1");

    let handle = manager
        .start_install("halt", config, false, false)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(manager.cancel("halt").await.unwrap());

    assert_eq!(handle.wait().await, InstallOutcome::Stopped);
    let stored = manager.store().load("halt").await.unwrap();
    assert_eq!(stored.status, InstanceStatus::Stopped);
    assert!(stored.error.is_none());

    let events = drain(&mut rx);
    assert!(!percents(&events).contains(&100));
    assert!(!events.iter().any(|e| matches!(
        &e.payload,
        EventPayload::StatusChange { status: InstanceStatus::Error, .. }
    )));
}

#[tokio::test]
async fn path_like_names_and_versions_are_refused() {
    init_tracing();
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), settings(&server));

    let result = manager
        .start_install(
            "../outside",
            InstanceConfig::new("outside", "1.20.1", LoaderFamily::None),
            false,
            false,
        )
        .await;
    assert!(matches!(
        result,
        Err(InstallError::Store(StoreError::InvalidName(name))) if name == "../outside"
    ));

    let result = manager
        .start_install(
            "fine",
            InstanceConfig::new("fine", "../../1.20.1", LoaderFamily::None),
            false,
            false,
        )
        .await;
    assert!(matches!(result, Err(InstallError::InvalidVersion(_))));

    assert!(manager.tasks().is_empty());
    assert!(!dir.path().join("outside").exists());
    assert!(!manager.store().paths("fine").config_file().exists());
}

#[tokio::test]
async fn auto_install_refuses_traversing_file_names() {
    init_tracing();
    let server = MockServer::start().await;
    mount_fabric(&server, "1.20.1", "0.15.7").await;
    let uri = server.uri();
    Mock::given(method("GET"))
        .and(path("/modrinth/v2/project/sneaky/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "sneaky-v",
            "project_id": "sneaky",
            "files": [{
                "url": format!("{uri}/cdn/escaped.jar"),
                "filename": "../../../escaped.jar",
                "primary": true
            }]
        }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/escaped.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"escaped".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let settings = mineloom::Settings {
        auto_install: vec!["sneaky".into()],
        ..settings(&server)
    };
    let manager = manager(dir.path(), settings);
    let config = create_record(
        &manager,
        InstanceConfig::new("guarded", "1.20.1", LoaderFamily::Fabric),
    )
    .await;
    seed_base(&manager, "guarded", "1.20.1");

    let handle = manager
        .start_install("guarded", config, false, false)
        .await
        .unwrap();
    assert_eq!(handle.wait().await, InstallOutcome::Ready);

    assert!(!dir.path().join("escaped.jar").exists());
    let log = std::fs::read_to_string(manager.store().paths("guarded").install_log()).unwrap();
    assert!(log.contains("Auto-install: 0 installed, 1 skipped"));
}

#[tokio::test]
async fn optimization_falls_back_and_auto_install_counts() {
    init_tracing();
    let server = MockServer::start().await;
    mount_fabric(&server, "1.20.1", "0.15.7").await;
    let uri = server.uri();
    for project in ["lithium", "embeddium", "extra"] {
        Mock::given(method("GET"))
            .and(path(format!("/modrinth/v2/project/{project}/version")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": format!("{project}-v"),
                "project_id": project,
                "files": [{
                    "url": format!("{uri}/cdn/{project}.jar"),
                    "filename": format!("{project}.jar"),
                    "primary": true,
                    "size": 3,
                    "hashes": {}
                }]
            }])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/cdn/{project}.jar")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jar".to_vec()))
            .mount(&server)
            .await;
    }
    // sodium, rubidium and the rest list nothing for this target
    Mock::given(method("GET"))
        .and(path_regex(r"^/modrinth/v2/project/[a-z]+/version$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let settings = mineloom::Settings {
        optimize: true,
        auto_install: vec!["extra".into(), "missing".into()],
        ..settings(&server)
    };
    let manager = manager(dir.path(), settings);
    create_record(
        &manager,
        InstanceConfig::new("fast", "1.20.1", LoaderFamily::Fabric),
    )
    .await;
    seed_base(&manager, "fast", "1.20.1");

    let config = manager.store().load("fast").await.unwrap();
    let handle = manager.start_install("fast", config, false, false).await.unwrap();
    assert_eq!(handle.wait().await, InstallOutcome::Ready);

    let paths = manager.store().paths("fast");
    let mods = paths.content_dir(ContentKind::Mod);
    assert!(mods.join("embeddium.jar").is_file());
    assert!(mods.join("lithium.jar").is_file());
    assert!(mods.join("extra.jar").is_file());
    assert!(!mods.join("sodium.jar").exists());

    let log = std::fs::read_to_string(paths.install_log()).unwrap();
    assert!(log.contains("Auto-install: 1 installed, 1 skipped"));
}

#[tokio::test]
async fn recent_log_is_bounded() {
    init_tracing();
    let server = MockServer::start().await;
    mount_base(&server, "1.20.1").await;

    let dir = tempfile::tempdir().unwrap();
    let settings = mineloom::Settings {
        log_ring_capacity: 3,
        ..settings(&server)
    };
    let manager = manager(dir.path(), settings);
    let handle = manager
        .create_instance(InstanceConfig::new("small", "1.20.1", LoaderFamily::None))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        while manager.tasks().is_active("small") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let recent = handle.recent_log();
    assert_eq!(recent.len(), 3);
    assert!(recent.last().unwrap().ends_with("Installation complete"));
    assert_eq!(handle.wait().await, InstallOutcome::Ready);

    let config = manager.store().load("small").await.unwrap();
    assert_eq!(config.version_id.as_deref(), Some("1.20.1"));
    assert!(config.loader_version.is_none());
}
