pub mod pruner;
pub mod worker;

pub use pruner::{PruneOutcome, PruneSkip, RetentionPruner, prune_cutoff};
pub use worker::{RetentionWorker, spawn_retention_worker};
