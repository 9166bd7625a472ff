//! Buffering and fan-out: channels, the multi-channel dispatcher and the
//! per-context accumulator.

pub mod accumulator;
pub mod channel;
pub mod dispatcher;

pub use accumulator::{Accumulator, AccumulatorOptions, FlushReport};
pub use channel::{Channel, ChannelRegistry, DeliveryCounts};
pub use dispatcher::{resolve_stack, DispatchReport, Dispatcher};
