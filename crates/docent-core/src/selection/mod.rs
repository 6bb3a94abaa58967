//! Passage selection detection for the "ask about this" affordance.

mod source;
mod watcher;

pub use source::{HostEvent, RawSelection, SelectionError, SelectionRect, SelectionSource};
pub use watcher::{
    ANCHOR_OFFSET, AnchorPosition, SelectionContext, SelectionUpdate, SelectionWatcher,
};
