//! ---
//! awm_section: "02-telemetry-acquisition"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Telemetry acquisition pipeline and job scheduling."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
//! Telemetry acquisition for AirWatch: invoking the external metering
//! reader, decoding its discriminated payload, validating raw readings, and
//! persisting batches on a fixed schedule with an overlap guard.

pub mod job;
pub mod payload;
pub mod pipeline;
pub mod reader;
pub mod validate;

pub use job::AcquisitionJob;
pub use payload::{RawReading, ReaderPayload};
pub use pipeline::{AcquisitionPipeline, AcquisitionReport, AcquisitionStatus};
pub use reader::{MeterReader, ReaderError, ReaderOutput};
pub use validate::{transform_batch, InvalidReading, TIMESTAMP_FORMATS};
