use thiserror::Error;

/// A sampling round that could not complete.
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Collector `{collector}` failed to read `{source_name}`: {message}")]
    Source {
        collector: String,
        source_name: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read procfs: {0}")]
    Procfs(#[from] procfs::ProcError),
}
