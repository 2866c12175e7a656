//! # Shelter - Secret-Gated File Hosting
//!
//! Shelter stores uploaded files under collision-resistant names, optionally
//! gzip-compressed and encrypted with AES-256-CBC under a fresh per-upload
//! key, and streams them back to anyone holding the name and the key.
//!
//! ## Features
//!
//! - **Shared-secret uploads**: a static secret set gates all writes
//! - **Per-upload keys**: 256-bit keys generated per object, returned to the
//!   client and never stored by the pipeline
//! - **Streaming transforms**: compression and encryption run chunk-by-chunk
//!   with bounded memory
//! - **Guarded retrieval**: requested names are canonicalized and confined to
//!   the storage root
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::io::Cursor;
//! use shelter::{config::Config, storage::{FilePart, Store, UploadRequest}};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cfg = Config::default();
//!     let store = Store::new(&cfg).await?;
//!
//!     let stored = store
//!         .write(UploadRequest {
//!             secret: Some(cfg.secrets[0].clone()),
//!             file: Some(FilePart {
//!                 filename: "hello.txt".into(),
//!                 extension: "txt".into(),
//!                 content: Cursor::new(b"hello".to_vec()),
//!             }),
//!         })
//!         .await?;
//!
//!     let mut out = Vec::new();
//!     store.read(&stored.name, stored.key.as_deref(), &mut out).await?;
//!     assert_eq!(out, b"hello");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod guard;
pub mod http;
pub mod naming;
pub mod storage;
pub mod transform;

// Re-export common types for convenience
pub use error::ShelterError;
