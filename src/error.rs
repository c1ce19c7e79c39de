use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum HaloError {
    /// An expected external file is absent for a snapshot.
    MissingInput { snap: Option<usize>, path: PathBuf },
    /// The structure-finder reader returned nothing for a required snapshot.
    MissingBaseCatalog { snap: usize, path: PathBuf },
    CorruptCheckpoint { path: PathBuf, reason: String },
    MissingField { snap: usize, field: String },
    IncompleteCollation { expected: usize, missing: Vec<usize> },
    InvalidArgument(String),
    Config(String),
    Worker { worker_id: usize, message: String },
    Serialization(Box<bincode::error::EncodeError>),
    Deserialization(Box<bincode::error::DecodeError>),
    Io(std::io::Error),
    Json(serde_json::Error),
    Other(String),
}

impl fmt::Display for HaloError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaloError::MissingInput { snap: Some(snap), path } => {
                write!(f, "Missing input for snap {}: {}", snap, path.display())
            }
            HaloError::MissingInput { snap: None, path } => {
                write!(f, "Missing input: {}", path.display())
            }
            HaloError::MissingBaseCatalog { snap, path } => {
                write!(f, "Missing base catalog for snap {}: {}", snap, path.display())
            }
            HaloError::CorruptCheckpoint { path, reason } => {
                write!(f, "Corrupt checkpoint {}: {}", path.display(), reason)
            }
            HaloError::MissingField { snap, field } => {
                write!(f, "Snap {} has no {} field", snap, field)
            }
            HaloError::IncompleteCollation { expected, missing } => write!(
                f,
                "Collation expected {} snapshots, missing {:?}",
                expected, missing
            ),
            HaloError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            HaloError::Config(e) => write!(f, "Config error: {}", e),
            HaloError::Worker { worker_id, message } => {
                write!(f, "Worker {} failed: {}", worker_id, message)
            }
            HaloError::Serialization(e) => write!(f, "Serialization error: {}", e),
            HaloError::Deserialization(e) => write!(f, "Deserialization error: {}", e),
            HaloError::Io(e) => write!(f, "IO error: {}", e),
            HaloError::Json(e) => write!(f, "JSON error: {}", e),
            HaloError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for HaloError {}

impl HaloError {
    /// Stage-level errors abort the pipeline; everything else degrades per snapshot.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, HaloError::MissingInput { .. } | HaloError::MissingField { .. })
    }
}

impl From<bincode::error::EncodeError> for HaloError {
    fn from(err: bincode::error::EncodeError) -> Self {
        HaloError::Serialization(Box::new(err))
    }
}

impl From<bincode::error::DecodeError> for HaloError {
    fn from(err: bincode::error::DecodeError) -> Self {
        HaloError::Deserialization(Box::new(err))
    }
}

impl From<std::io::Error> for HaloError {
    fn from(err: std::io::Error) -> Self {
        HaloError::Io(err)
    }
}

impl From<serde_json::Error> for HaloError {
    fn from(err: serde_json::Error) -> Self {
        HaloError::Json(err)
    }
}

impl From<String> for HaloError {
    fn from(err: String) -> Self {
        HaloError::Other(err)
    }
}

impl From<&str> for HaloError {
    fn from(err: &str) -> Self {
        HaloError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_snapshot() {
        let err = HaloError::MissingBaseCatalog {
            snap: 7,
            path: PathBuf::from("/data/cat_007"),
        };
        let msg = err.to_string();
        assert!(msg.contains("snap 7"), "{}", msg);
        assert!(msg.contains("/data/cat_007"), "{}", msg);
    }

    #[test]
    fn test_missing_input_is_not_fatal() {
        let err = HaloError::MissingInput {
            snap: Some(3),
            path: PathBuf::from("x"),
        };
        assert!(!err.is_fatal());
        assert!(HaloError::from("boom").is_fatal());
    }
}
