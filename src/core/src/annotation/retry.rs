use std::future::Future;
use std::time::Duration;

use log::{debug, warn};

use crate::configuration::AnnotationSettings;
use crate::error_handling::types::AnnotationError;

/// Bounded waiting for the annotation service: each attempt gets `timeout`,
/// and at most `max_attempts` attempts are made in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    /// 15 seconds per attempt, one retry.
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_attempts: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_settings(settings: &AnnotationSettings) -> Self {
        Self::new(Duration::from_secs(settings.timeout_secs), settings.max_attempts)
    }

    /// Runs `attempt` until it succeeds, fails permanently, or the attempts
    /// are used up. The last error is returned.
    pub async fn run<F, Fut>(&self, mut attempt: F) -> Result<String, AnnotationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, AnnotationError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut number = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, attempt()).await {
                Ok(result) => result,
                Err(_) => Err(AnnotationError::Timeout),
            };
            match result {
                Ok(text) => return Ok(text),
                Err(e) if number < max_attempts && is_transient(&e) => {
                    warn!("Annotation attempt {}/{} failed: {}", number, max_attempts, e);
                    number += 1;
                }
                Err(e) => {
                    debug!("Annotation gave up after {} attempt(s): {}", number, e);
                    return Err(e);
                }
            }
        }
    }
}

fn is_transient(error: &AnnotationError) -> bool {
    match error {
        AnnotationError::Timeout | AnnotationError::HttpError(_) => true,
        AnnotationError::BadStatus(code) => *code == 429 || *code >= 500,
        AnnotationError::MissingApiKey | AnnotationError::EmptyResponse => false,
    }
}
