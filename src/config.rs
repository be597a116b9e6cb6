use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::VersionError;

pub mod settings;
pub mod stream;

pub use settings::Settings;
pub use stream::{EventPayload, InstallEvent, StreamLine, StreamSource};

/// Loader family layered on top of a base Minecraft version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderFamily {
    #[default]
    None,
    Fabric,
    Quilt,
    Forge,
    NeoForge,
}

impl LoaderFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderFamily::None => "none",
            LoaderFamily::Fabric => "fabric",
            LoaderFamily::Quilt => "quilt",
            LoaderFamily::Forge => "forge",
            LoaderFamily::NeoForge => "neoforge",
        }
    }

    /// Loader names accepted by the content registry for mods of this family.
    ///
    /// Quilt loads Fabric mods as well, so both are queried. Vanilla instances
    /// cannot load mods at all and get an empty list.
    pub fn content_loaders(&self) -> Vec<&'static str> {
        match self {
            LoaderFamily::None => Vec::new(),
            LoaderFamily::Fabric => vec!["fabric"],
            LoaderFamily::Quilt => vec!["quilt", "fabric"],
            LoaderFamily::Forge => vec!["forge"],
            LoaderFamily::NeoForge => vec!["neoforge"],
        }
    }
}

impl Display for LoaderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoaderFamily {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" | "vanilla" => Ok(LoaderFamily::None),
            "fabric" => Ok(LoaderFamily::Fabric),
            "quilt" => Ok(LoaderFamily::Quilt),
            "forge" => Ok(LoaderFamily::Forge),
            "neoforge" => Ok(LoaderFamily::NeoForge),
            other => Err(VersionError::UnknownLoader(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub year: u32,
    pub week: u32,
    pub build: char,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MinecraftVersion {
    Release(Version),
    Snapshot(Snapshot),
}

impl MinecraftVersion {
    /// Version prefix NeoForge uses for builds targeting this release.
    ///
    /// `1.20.4` maps to `20.4.` and `1.21` to `21.0.`. Snapshots have no
    /// NeoForge line.
    pub fn neoforge_prefix(&self) -> Option<String> {
        match self {
            MinecraftVersion::Release(v) if v.major == 1 => {
                Some(format!("{}.{}.", v.minor, v.patch))
            }
            _ => None,
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        }
    }
}

impl Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}w{:02}{}", self.year, self.week, self.build)
    }
}

impl Display for MinecraftVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinecraftVersion::Release(v) => v.fmt(f),
            MinecraftVersion::Snapshot(s) => s.fmt(f),
        }
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut split = s.split('.');

        let major_str = split
            .next()
            .filter(|v| !v.is_empty())
            .ok_or(VersionError::MissingMajor)?;
        let minor_str = split.next().ok_or(VersionError::MissingMinor)?;
        // releases such as 1.20 or 1.21 omit the patch component
        let patch_str = split.next();

        if split.next().is_some() {
            return Err(VersionError::ExtraComponents);
        }

        let major = major_str
            .parse::<u32>()
            .map_err(|_| VersionError::IncorrectMajor(major_str.to_string()))?;

        let minor = minor_str
            .parse::<u32>()
            .map_err(|_| VersionError::IncorrectMinor(minor_str.to_string()))?;

        let patch = match patch_str {
            Some(p) => p
                .parse::<u32>()
                .map_err(|_| VersionError::IncorrectPatch(p.to_string()))?,
            None => 0,
        };

        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl FromStr for Snapshot {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year_str, rest) = s
            .split_once('w')
            .ok_or(VersionError::InvalidSnapshotFormat)?;

        if rest.len() != 3 || !rest.is_char_boundary(2) {
            return Err(VersionError::InvalidSnapshotFormat);
        }

        let week_str = &rest[..2];
        let build_str = &rest[2..];

        let year = year_str
            .parse::<u32>()
            .map_err(|_| VersionError::IncorrectYear(year_str.to_string()))?;

        let week = week_str
            .parse::<u32>()
            .map_err(|_| VersionError::IncorrectWeek(week_str.to_string()))?;

        let build = match build_str.chars().next() {
            Some(c) if c.is_ascii_lowercase() => c,
            _ => return Err(VersionError::IncorrectBuild(build_str.to_string())),
        };

        Ok(Self { year, week, build })
    }
}

impl FromStr for MinecraftVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(ver) = Version::from_str(s) {
            return Ok(MinecraftVersion::Release(ver));
        }

        if let Ok(snap) = Snapshot::from_str(s) {
            return Ok(MinecraftVersion::Snapshot(snap));
        }

        Err(VersionError::UnknownVersionFormat(s.to_string()))
    }
}
