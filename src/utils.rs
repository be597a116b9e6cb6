use std::{
    io,
    path::{Component, Path, PathBuf},
};

use chrono::Local;
use sha2::{Digest, Sha512};
use tokio::fs;
use uuid::Uuid;

/// Fresh sibling path used as a write target before renaming into `dest`.
pub fn scratch_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.{}.part", name, Uuid::new_v4().simple()))
}

/// Writes `data` to `dest` through a scratch file so readers never observe a
/// partially written destination.
pub async fn write_atomic(dest: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    let scratch = scratch_path(dest);
    if let Err(err) = fs::write(&scratch, data).await {
        _ = fs::remove_file(&scratch).await;
        return Err(err);
    }

    if let Err(err) = fs::rename(&scratch, dest).await {
        _ = fs::remove_file(&scratch).await;
        return Err(err);
    }

    Ok(())
}

pub async fn sha512_file(path: &Path) -> io::Result<String> {
    let data = fs::read(path).await?;
    tokio::task::spawn_blocking(move || hex::encode(Sha512::digest(&data)))
        .await
        .map_err(io::Error::other)
}

/// Removes a file, treating "already gone" as success.
pub async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

pub fn log_stamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Turns a human-chosen instance name into a single safe path component.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    cleaned.trim_matches('.').to_string()
}

/// True when `name` is exactly one normal path component, so joining it
/// onto a directory stays inside that directory.
pub fn is_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

/// True when `path` is relative and made only of normal components.
pub fn is_nested_path(path: &str) -> bool {
    !path.is_empty()
        && !path.contains('\\')
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}
