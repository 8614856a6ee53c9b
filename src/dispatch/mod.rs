//! Executes named documents against a transport and shapes their results

mod dispatcher;
mod observer;
mod request;
mod result;

pub use dispatcher::{Dispatcher, ErrorPolicy};
pub use observer::{ErrorObserver, ErrorReporter, ErrorState, ValidationState};
pub use request::CallRequest;
pub use result::{CallOutcome, CallResult, ErrorInfo, ErrorKind, merge_data, root_error};
