//! Value model, string-keyed dictionary, and endpoint list primitives
//! shared by every Droplet backend.

pub mod dict;
pub mod endpoint;
pub mod value;

pub use dict::Dict;
pub use endpoint::{Endpoint, EndpointError, EndpointList};
pub use value::Value;
