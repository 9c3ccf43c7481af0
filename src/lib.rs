//! classdrop - classroom file sharing
//!
//! Classes are identified by a short shareable code and hold folders of
//! uploaded files. Records live in a document store with live change
//! subscriptions; file contents live in a blob store.

pub mod app;
pub mod backend;
pub mod classroom;
pub mod config;
pub mod datetime;
pub mod error;
pub mod logging;

pub use app::{ClassDetailScreen, ClassListScreen, Route};
pub use backend::{Backend, BlobStore, DocumentStore, Subscription};
pub use classroom::{
    ClassRecord, ClassRepository, FileRecord, FileRepository, Folder, UploadInput,
};
pub use config::Config;
pub use error::{ClassdropError, Result};
