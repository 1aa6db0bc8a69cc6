//! CSV readers and result writers for the encounter pipeline.

mod domain;
mod error;
mod grid_reader;
mod observation_reader;
mod writer;

pub use domain::ExperimentName;
pub use error::IoError;
pub use grid_reader::GridReader;
pub use observation_reader::ObservationReader;
pub use writer::ResultWriter;
