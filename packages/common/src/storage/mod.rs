mod error;
mod traits;

pub mod filesystem;
pub mod sanitize;

pub use error::StorageError;
pub use filesystem::{FilesystemBlobStore, StorageConfig};
pub use traits::{BlobStore, BoxReader, OpenedBlob, RemovalOutcome, StoredBlob};
