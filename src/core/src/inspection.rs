pub mod coordinator;
pub mod types;

pub use coordinator::{AnnotationJob, DetailCoordinator};
pub use types::{DetailState, DetailView, SelectionToken};
