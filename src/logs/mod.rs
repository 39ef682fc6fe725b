//! Log broadcast hub.
//!
//! Worker output is appended to a [`LogHub`], which keeps a bounded
//! history and fans every line out to registered observers. The HTTP
//! layer attaches one channel observer per live-push client.

pub mod hub;

pub use hub::{LogHub, LogLine, LogObserver, ObserverId, Subscription};
