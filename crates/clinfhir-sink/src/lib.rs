//! Output side of the conversion pipeline: dispatching finished bundles to
//! the console, the filesystem or a remote FHIR repository.

pub mod dispatcher;
pub mod error;
pub mod repository;

pub use dispatcher::{OutputDispatcher, OutputMode, bundle_file_name};
pub use error::{Result, SinkError};
pub use repository::{HttpRepository, ResourceRepository, RetryPolicy};
