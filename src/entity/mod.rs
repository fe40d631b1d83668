pub mod dataset_types;
pub mod datasets;
pub mod provenance;
pub mod sensors;
pub mod timeseries;
pub mod types;

pub use types::DataType;
