//! Filter expression DSL: parsing, lowering, and the request/response types
//! built on top of it.

pub mod parser;
pub mod types;

pub use parser::{lower, parse, ParseError};
pub use types::{
    DiscoveryRequest, FilterCondition, FilterExpression, FilterOperator, FilterValue,
    MeasurementFilter, TimeRange, TimeseriesFilter, ValueCondition, VerifyRequest,
    VerifyResponse,
};
