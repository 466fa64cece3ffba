//! Push Channel
//!
//! Server-initiated events over an authenticated stream, bound to the
//! current session credential.

mod channel;
mod events;
mod transport;

pub use channel::{ChannelState, PushChannel, PushEnvelope, PushHandle, PushSink};
pub use events::{Notification, PushEvent};
pub use transport::{PushConnection, PushFrame, PushTransport, SseDecoder, SseTransport};
