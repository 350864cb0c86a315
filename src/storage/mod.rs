pub mod document;
pub mod persistence;

pub use document::{Collection, Document, DocumentStore, ID_FIELD};
pub use persistence::{CHECKPOINT_EVERY, DurabilityMode, PersistenceManager, WalEntry};
