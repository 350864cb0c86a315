//! Request envelope pipeline.

pub mod body;
pub mod ignore;
pub mod labels;
pub mod middleware;

pub use body::{REDACTED, render_body, serialize_headers, snapshot_body};
pub use ignore::{is_static_asset, own_prefix, should_ignore};
pub use labels::{RouteLabels, route_labels};
pub use middleware::{ABORTED_MESSAGE, CapturePipeline, capture, capture_layer, client_address};
