use std::{
    fmt::{self, Display},
    sync::LazyLock,
};

use regex::Regex;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("static ANSI pattern is valid")
});

/// Identifies who produced a line of installer output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSource {
    Stdout,
    Stderr,
    Pipeline,
}

/// A single line of install transcript along with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLine {
    pub line: String,
    pub source: StreamSource,
}

impl StreamLine {
    pub fn new<S: Into<String>>(line: S, source: StreamSource) -> Self {
        let line = line.into();
        let line = ANSI_ESCAPE.replace_all(&line, "").trim_end().to_string();
        Self { line, source }
    }

    pub fn stdout<S: Into<String>>(line: S) -> Self {
        Self::new(line, StreamSource::Stdout)
    }

    pub fn stderr<S: Into<String>>(line: S) -> Self {
        Self::new(line, StreamSource::Stderr)
    }

    pub fn pipeline<S: Into<String>>(line: S) -> Self {
        Self::new(line, StreamSource::Pipeline)
    }

    pub fn msg(&self) -> &str {
        &self.line
    }

    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }
}

impl Display for StreamLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            StreamSource::Stderr => write!(f, "[installer!] {}", self.line),
            StreamSource::Stdout => write!(f, "[installer] {}", self.line),
            StreamSource::Pipeline => write!(f, "{}", self.line),
        }
    }
}
