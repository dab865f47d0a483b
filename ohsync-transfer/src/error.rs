use thiserror::Error;

/// Failure of the download pool itself. Per-file failures are reported in
/// [`crate::DownloadReport::failed`] instead.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("could not start the transfer runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("{task} task join failure: {message}")]
    Join { task: String, message: String },

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}
