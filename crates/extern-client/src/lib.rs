//! Network side of an extern session: configuration, the HTTP transport and
//! the connection supervisor that keeps the fragment stream alive.

pub mod backoff;
pub mod config;
pub mod errors;
pub mod http;
pub mod stream;
pub mod supervisor;

pub use backoff::Backoff;
pub use config::{BackoffConfig, ExternConfig};
pub use errors::ConfigError;
pub use http::HttpAssetFetcher;
pub use stream::{ChunkStream, HttpStreamClient, StreamClient, TextStream};
pub use supervisor::{Collaborators, ConnectionSupervisor};
