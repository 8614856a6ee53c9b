use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use super::{CallResult, ErrorInfo, root_error};

/// Receives the errors of every single-document aggregated call, so a UI can
/// show the latest failure. Called with an empty list after a success.
pub trait ErrorObserver: Send + Sync {
    fn record(&self, errors: &[ErrorInfo], root_message: Option<&str>);
}

/// Form validation state that a failed call may reset
pub trait ValidationState: Send + Sync {
    fn touch(&self);
    fn reset(&self);
}

#[derive(Debug, Default)]
struct LastErrors {
    errors: Vec<ErrorInfo>,
    root_message: Option<String>,
}

/// Keeps the most recently recorded errors. Clones share state.
///
/// Unrelated concurrent calls reporting to the same state overwrite each
/// other; the last to finish is what remains.
#[derive(Clone, Debug, Default)]
pub struct ErrorState {
    last: Arc<Mutex<LastErrors>>,
}

impl ErrorState {
    pub fn new() -> ErrorState {
        ErrorState::default()
    }

    /// Errors of the last reported call
    pub fn errors(&self) -> Vec<ErrorInfo> {
        self.lock().errors.clone()
    }

    /// Message of the first root error of the last reported call
    pub fn root_message(&self) -> Option<String> {
        self.lock().root_message.clone()
    }

    fn lock(&self) -> MutexGuard<'_, LastErrors> {
        // the guarded data is always left consistent
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ErrorObserver for ErrorState {
    fn record(&self, errors: &[ErrorInfo], root_message: Option<&str>) {
        let mut last = self.lock();
        last.errors = errors.to_vec();
        last.root_message = root_message.map(str::to_string);
    }
}

/// Forwards single-document results to an [`ErrorObserver`], and optionally
/// touches then resets a [`ValidationState`] when they carry errors
#[derive(Clone, Default)]
pub struct ErrorReporter {
    observer: Option<Arc<dyn ErrorObserver>>,
    validation: Option<Arc<dyn ValidationState>>,
    reset_validation: bool,
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("observer", &self.observer.is_some())
            .field("validation", &self.validation.is_some())
            .field("reset_validation", &self.reset_validation)
            .finish()
    }
}

impl ErrorReporter {
    pub fn new() -> ErrorReporter {
        ErrorReporter::default()
    }

    pub fn with_observer(mut self, observer: Arc<dyn ErrorObserver>) -> ErrorReporter {
        self.observer = Some(observer);
        self
    }

    pub fn with_validation(mut self, validation: Arc<dyn ValidationState>) -> ErrorReporter {
        self.validation = Some(validation);
        self
    }

    /// Whether a failed call touches then resets the validation state
    pub fn reset_validation(mut self, enabled: bool) -> ErrorReporter {
        self.reset_validation = enabled;
        self
    }

    pub fn report(&self, result: &CallResult) {
        let root_message = root_error(&result.errors);
        if let Some(observer) = &self.observer {
            observer.record(&result.errors, root_message);
        }
        if result.errors.is_empty() || !self.reset_validation {
            return;
        }
        if let Some(validation) = &self.validation {
            tracing::debug!("resetting validation state after failed call");
            validation.touch();
            validation.reset();
        }
    }
}
