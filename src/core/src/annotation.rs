pub mod client;
pub mod prompts;
pub mod retry;
pub mod types;

pub use client::{DisabledAnnotator, GeminiClient};
pub use retry::RetryPolicy;
pub use types::{AnnotationRequest, Annotator, Language};
