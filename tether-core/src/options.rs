use crate::{Error, MEMORY_LOCATION, Result};
use std::{
    fmt::{self, Display},
    path::PathBuf,
    str::FromStr,
};

/// How a connection is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    #[default]
    ReadWriteCreate,
}

impl Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpenMode::ReadOnly => "ro",
            OpenMode::ReadWrite => "rw",
            OpenMode::ReadWriteCreate => "rwc",
        })
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ro" => Ok(OpenMode::ReadOnly),
            "rw" => Ok(OpenMode::ReadWrite),
            "rwc" => Ok(OpenMode::ReadWriteCreate),
            _ => Err(Error::msg(format!(
                "Unknown mode `{}`, expected one of `ro`, `rw`, `rwc`",
                s
            ))),
        }
    }
}

/// Where and how to open a connection, usually decoded from an url like
/// `sqlite://path/to/file.sqlite?mode=rwc` or `sqlite://:memory:`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Database file, `None` for an in-memory database.
    pub file: Option<PathBuf>,
    pub mode: OpenMode,
}

impl ConnectionOptions {
    pub const SCHEME: &'static str = "sqlite";

    pub fn memory() -> Self {
        Default::default()
    }

    pub fn file(file: impl Into<PathBuf>, mode: OpenMode) -> Self {
        Self {
            file: Some(file.into()),
            mode,
        }
    }

    pub fn parse(url: &str) -> Result<Self> {
        let prefix = format!("{}://", Self::SCHEME);
        let Some(rest) = url.strip_prefix(&prefix) else {
            return Err(Error::msg(format!(
                "Expected sqlite connection url to start with `{}`",
                &prefix
            )));
        };
        let context = || format!("Error while decoding connection URL: `{}`", url);
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        let path = urlencoding::decode(path).map_err(|e| Error::new(e).context(context()))?;
        let mut mode = OpenMode::default();
        for pair in query.split('&').filter(|v| !v.is_empty()) {
            match pair.split_once('=') {
                Some(("mode", value)) => {
                    mode = value.parse().map_err(|e: Error| e.context(context()))?;
                }
                _ => {
                    return Err(Error::msg(format!("Unexpected url parameter `{}`", pair))
                        .context(context()));
                }
            }
        }
        let file = match path.as_ref() {
            "" | MEMORY_LOCATION => None,
            path => Some(PathBuf::from(path)),
        };
        Ok(Self { file, mode })
    }
}

impl FromStr for ConnectionOptions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Display for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = match &self.file {
            Some(file) => urlencoding::encode(&file.to_string_lossy()).into_owned(),
            None => MEMORY_LOCATION.to_string(),
        };
        write!(f, "{}://{}?mode={}", Self::SCHEME, location, self.mode)
    }
}
