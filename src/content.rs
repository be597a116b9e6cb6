use std::{io, path::PathBuf};

use tokio::fs::read_dir;

use crate::instance::{ContentKind, InstancePaths};

mod cache;
mod resolver;

pub use cache::{ContentCache, ContentMeta};
pub use resolver::{MigrationCandidate, ModResolver, Resolution};

/// An add-on file sitting in one of the instance content directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub kind: ContentKind,
    pub file_name: String,
    pub size: u64,
    pub path: PathBuf,
}

impl ContentItem {
    /// Weak identity used before paying for a content hash.
    pub fn fingerprint(&self) -> String {
        format!("{}:{}", self.file_name, self.size)
    }
}

/// Lists the regular files in the `kind` directory of an instance. Hidden
/// files (scratch downloads included) are ignored; a missing directory is
/// empty.
pub async fn scan(paths: &InstancePaths, kind: ContentKind) -> io::Result<Vec<ContentItem>> {
    let dir = paths.content_dir(kind);
    let mut entries = match read_dir(&dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut items = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.starts_with('.') {
            continue;
        }

        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }

        items.push(ContentItem {
            kind,
            file_name,
            size: meta.len(),
            path: entry.path(),
        });
    }

    items.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scan_skips_hidden_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let paths = InstancePaths::new(dir.path());
        let mods = paths.content_dir(ContentKind::Mod);
        std::fs::create_dir_all(mods.join("config")).unwrap();
        std::fs::write(mods.join("b.jar"), b"bb").unwrap();
        std::fs::write(mods.join("a.jar"), b"a").unwrap();
        std::fs::write(mods.join(".a.jar.1234.part"), b"partial").unwrap();

        let items = scan(&paths, ContentKind::Mod).await.unwrap();
        let names: Vec<_> = items.iter().map(|i| i.fingerprint()).collect();
        assert_eq!(names, vec!["a.jar:1", "b.jar:2"]);

        assert!(scan(&paths, ContentKind::ShaderPack).await.unwrap().is_empty());
    }
}
