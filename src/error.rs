use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, UniteError>;

#[derive(Error, Debug)]
pub enum UniteError {
    #[error("No such entry: {0}")]
    NotFound(String),

    #[error("File handle {0} is not registered")]
    BadHandle(u64),

    #[error("File handle {0} is already registered")]
    AlreadyRegistered(u64),

    #[error("Inode {0} has no backing file")]
    BadFileDescriptor(u64),

    #[error("Inode {0} is a directory")]
    IsDirectory(u64),

    #[error("Inode {0} is not a directory")]
    NotADirectory(u64),

    #[error("Inode {0} is already registered in the tree")]
    DuplicateInode(u64),

    #[error("Subtree already registered: {0}")]
    SubtreeAlreadyRegistered(PathBuf),

    #[error("Failed to build subtree {path}: {source}")]
    Build {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("FUSE error: {0}")]
    Fuse(String),
}

impl From<toml::de::Error> for UniteError {
    fn from(err: toml::de::Error) -> Self {
        UniteError::Config(err.to_string())
    }
}
