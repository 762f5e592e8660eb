pub mod win_event;

pub use win_event::{Subscription, watch_destroy, watch_size};
