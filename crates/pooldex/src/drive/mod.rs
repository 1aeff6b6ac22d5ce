//! Drive storage integration.
//!
//! This module covers everything between the job and the shared drive:
//!
//! - `auth`: OAuth2 Device Flow authorization and token persistence
//! - `client`: the Drive v3 REST client behind the [`FolderStore`] seam
//! - `error`: drive error types

pub mod auth;
pub mod client;
pub mod error;

pub use auth::{ClientSecrets, DeviceFlowAuth, StoredTokenProvider, TokenProvider, DRIVE_SCOPES};
pub use client::{CandidateFile, DriveClient, FolderStore};
pub use error::{DriveError, Result};
