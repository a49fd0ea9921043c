//! Reconciliation engine: the components that keep the store in step with
//! the host and the registry.

pub mod checker;
pub mod indexer;
pub mod linker;
pub mod reconciler;
pub mod scanner;

pub use checker::{UpdateChecker, UpdateReport};
pub use indexer::CatalogIndexer;
pub use linker::{LinkReport, Linker};
pub use reconciler::{ReconcilePhase, ReconcileReport, Reconciler};
pub use scanner::Scanner;
