//! Result export: XML serialization and upload to storage backends.

pub mod backend;
pub mod error;
pub mod exporter;
pub mod factory;
pub mod xml;

pub use backend::{
    DriveBackend, DriveClient, DriveClientError, LocalBackend, ObjectStoreBackend, StorageBackend,
};
pub use error::ExportError;
pub use exporter::StorageExporter;
pub use factory::build_exporter;
pub use xml::{serialize, serialize_at, ExportDocument};
