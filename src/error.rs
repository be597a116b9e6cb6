use std::path::PathBuf;

use thiserror::Error;

use crate::config::LoaderFamily;

#[derive(Debug, Clone, Error)]
pub enum VersionError {
    #[error("Incorrect major version: {0}")]
    IncorrectMajor(String),

    #[error("Incorrect minor version: {0}")]
    IncorrectMinor(String),

    #[error("Incorrect patch version: {0}")]
    IncorrectPatch(String),

    #[error("Incorrect snapshot year: {0}")]
    IncorrectYear(String),

    #[error("Incorrect snapshot week: {0}")]
    IncorrectWeek(String),

    #[error("Incorrect snapshot build: {0}")]
    IncorrectBuild(String),

    #[error("Missing major version")]
    MissingMajor,

    #[error("Missing minor version")]
    MissingMinor,

    #[error("Invalid snapshot format")]
    InvalidSnapshotFormat,

    #[error("Too many components")]
    ExtraComponents,

    #[error("Unrecognized version format: {0}")]
    UnknownVersionFormat(String),

    #[error("Unknown loader family: {0}")]
    UnknownLoader(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Malformed response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::Status { status: 404, .. })
    }
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("No {family} loader versions available for Minecraft {base_version}")]
    NoLoaderVersions {
        family: LoaderFamily,
        base_version: String,
    },

    #[error("Loader family {0} is not supported by this build")]
    Unsupported(LoaderFamily),

    #[error("Failed to start installer: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Installer exited with code {}", code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".into()))]
    InstallerExit { code: Option<i32> },

    #[error("Installer archive contains no version descriptor")]
    MissingDescriptor,

    #[error("Invalid version descriptor: {0}")]
    InvalidDescriptor(String),

    #[cfg(feature = "installer-loaders")]
    #[error("Failed to read installer archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Loader installer I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Loader installation was aborted")]
    Aborted,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Instance {0} does not exist")]
    NotFound(String),

    #[error("Invalid instance name: {0:?}")]
    InvalidName(String),

    #[error("Instance file I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed instance file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No version of {project} matches {loader} on {base_version}")]
    Unavailable {
        project: String,
        loader: LoaderFamily,
        base_version: String,
    },

    #[error("Version {0} has no downloadable files")]
    NoFiles(String),

    #[error("Refusing file name {0:?}")]
    UnsafeFileName(String),
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Minecraft version {0} was not found in the version manifest")]
    BaseVersionNotFound(String),

    #[error("Invalid Minecraft version: {0:?}")]
    InvalidVersion(String),

    #[error("Loader installation failed: {0}")]
    Loader(#[source] LoaderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Installation was aborted")]
    Aborted,
}

impl From<LoaderError> for InstallError {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::Aborted => InstallError::Aborted,
            other => InstallError::Loader(other),
        }
    }
}
