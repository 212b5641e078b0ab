//! Callback dispatch
//!
//! Every connection owns one [`Dispatcher`]: a FIFO of ready events and the
//! user callback that consumes them. At most one invocation per connection
//! runs at any instant, in any threading mode.

mod dispatcher;
mod event;

pub(crate) use dispatcher::{Dispatcher, Handler};
pub(crate) use event::Event;
pub use event::{RxCallback, RxDelivery, TxCallback, TxCompletion};
