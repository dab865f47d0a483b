//! ohsync core library: domain types, configuration and shared errors.
//!
//! - [`types`]: member ids, local/remote file records, the manifest union
//! - [`error`]: [`ConfigError`], [`IdListError`], [`RemoteError`], [`TransferError`]
//! - [`config`]: load / save of `~/.ohsync/config.yaml`
//! - [`size`]: `128m`-style size strings
//! - [`id_list`]: member allow/deny list files

pub mod config;
pub mod error;
pub mod id_list;
pub mod size;
pub mod types;

pub use config::Config;
pub use error::{transfer_io_err, ConfigError, IdListError, RemoteError, TransferError};
pub use types::{
    DeleteSelector, Freshness, LocalFileRecord, Manifest, ManifestEntry, ManifestShape,
    MemberData, MemberId, MemberSummary, PublicFileRecord, RemoteFileRecord, SubjectManifest,
};
