//! GraphQL query construction, typed response shapes, and the transport
//! boundary.

pub mod query;
pub mod transport;
pub mod types;

pub use query::{BatchItem, PageCursor};
pub use transport::{GraphqlTransport, HttpTransport, TransportError, DEFAULT_REQUEST_TIMEOUT};
