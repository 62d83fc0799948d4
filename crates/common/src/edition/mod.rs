//! Edition lifecycle
//!
//! An edition is one issue: a PDF, an ordered list of page images and a
//! little metadata. The modules here keep the stored record and the files on
//! disk consistent across create, update and delete.

pub mod classify;
pub mod cleanup;
pub mod dates;
pub mod paths;
pub mod reconcile;
pub mod service;
pub mod store;

pub use classify::{classify, ClassifiedUpload, PdfRequirement, UploadedFile};
pub use cleanup::{Cleanup, CleanupExecutor, CleanupOutcome, CleanupQueue, CleanupReport};
pub use paths::{to_public_path, to_storage_key, STORAGE_ROOT};
pub use reconcile::{EditionChanges, PendingDeletions};
pub use service::{EditionService, NewEditionInput};
pub use store::{Edition, EditionStore, EditionView, MemoryEditionStore, NewEdition};
