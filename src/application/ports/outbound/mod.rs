//! Outbound ports - Interfaces that the application requires from external systems

mod category_source_port;
mod selection_log_port;
mod submission_port;

pub use category_source_port::{CategorySourcePort, SourceError};
pub use selection_log_port::{CountTable, SelectionLogError, SelectionLogPort};
pub use submission_port::SubmissionPort;

#[cfg(test)]
pub(crate) use category_source_port::testing;
