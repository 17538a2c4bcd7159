pub mod protocol;

pub use mpx_error::{ConnectionError, MpxResult, StackError, StatusCode, SubscriptionError};
pub use protocol::ProtocolError;
