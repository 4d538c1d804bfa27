//! Client for the View & Data REST API: two-legged auth, storage buckets,
//! (resumable) uploads, translation, thumbnails and derivative download.

pub mod api_client;
pub mod auth;
pub mod config;
pub mod download;
pub mod translation;
pub mod urn;

pub use api_client::{
    BucketCreationData, BucketDetails, BucketPolicy, Manifest, RegisterResponse, ResumableUpload,
    UploadResponse, ViewDataClient,
};
pub use config::ClientConfig;
pub use download::{DownloadedItem, ItemKind};
pub use poll_until::{CancellationToken, PollOutcome};
