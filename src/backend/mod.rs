//! Recording server client: persistence, processing and downloads.
//!
//! [`StudioBackend`] is the seam the rest of the crate depends on;
//! [`HttpBackend`] is the reqwest implementation.  Tests substitute their
//! own `async_trait` doubles.

pub mod client;
pub mod request;

pub use client::{BackendError, HttpBackend, StudioBackend};
pub use request::{
    ExportFormat, Operation, ProcessResponse, ProcessingRequest, SaveResponse, UnknownFormat,
};

#[cfg(test)]
pub(crate) mod testing;
