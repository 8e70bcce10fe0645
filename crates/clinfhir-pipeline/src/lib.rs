//! Bundle assembly and concurrent conversion pipeline.
//!
//! The pipeline turns hierarchical [`ClinicalRecord`]s into size-bounded,
//! deduplicated, self-contained transaction bundles and hands them to a
//! consumer through an asynchronous channel:
//!
//! scheduler → worker → (record source, resource factories) → bundle
//! assembler → publisher → channel → consumer → bundle handler (sink).
//!
//! [`ClinicalRecord`]: clinfhir_core::ClinicalRecord

pub mod assembler;
pub mod config;
pub mod dedup;
pub mod error;
pub mod factory;
pub mod metrics;
pub mod queue;
pub mod scheduler;
pub mod source;
pub mod summary;
pub mod terminology;
pub mod worker;

pub use assembler::BundleAssembler;
pub use config::ConversionConfig;
pub use dedup::{DedupRegistry, DedupScope};
pub use error::{PipelineError, Result};
pub use factory::ConversionContext;
pub use metrics::TimingLog;
pub use queue::{BundleConsumer, BundleHandler, BundlePublisher, ConsumerReport, bundle_channel};
pub use scheduler::{CancelFlag, ConversionScheduler};
pub use source::RecordSource;
pub use summary::{PatientOutcome, PatientStats, RunSummary};
pub use terminology::{CachedLookup, CodeLookup, TableLookup};
