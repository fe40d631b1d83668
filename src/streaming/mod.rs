//! Live subscription layer: materialized-view cursors, WebSocket sessions
//! and the process-wide subscription registry.

pub mod registry;
pub mod session;
pub mod view;

pub use registry::{SubscriptionHandle, SubscriptionRegistry};
pub use session::{ModePolicy, SubscribePayload, SubscriptionMode};
pub use view::{MeasurementUpdate, SubscriptionSpec};
