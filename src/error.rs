use std::path::PathBuf;

/// The six error kinds named by the mining engine's error-handling design.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("phrase tree not built: pass 3 ran before pass 2 set pt_registered")]
    TreeNotBuilt,

    #[error("retention mismatch: stored frequency is incompatible with existing blocks")]
    RetentionMismatch,

    #[error("empty phrase: rearrangement produced a zero-token template")]
    EmptyPhrase,
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io { path: PathBuf::new(), source }
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Io {
            path: PathBuf::new(),
            source: std::io::Error::new(std::io::ErrorKind::Other, err.to_string()),
        }
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Config(format!("invalid regex: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attaches a path to an I/O error for more useful diagnostics.
pub(crate) trait WithPath<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> WithPath<T> for std::result::Result<T, std::io::Error> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io { path: path.into(), source })
    }
}
