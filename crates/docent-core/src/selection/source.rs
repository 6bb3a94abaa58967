use thiserror::Error;

/// Bounding rectangle of the first selection range, in viewport pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SelectionRect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

/// What the host reports for the current user selection.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSelection {
    pub text: String,
    pub rect: SelectionRect,
    /// Vertical scroll offset of the page at the time of the query.
    pub scroll_y: f64,
}

/// Page events the host forwards to the watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostEvent {
    /// The pointer was released somewhere in the document.
    PointerUp,
    Scroll,
}

#[derive(Clone, Debug, Error)]
pub enum SelectionError {
    #[error("Selection API unavailable: {0}")]
    Unavailable(String),

    /// Something is selected but the host cannot resolve it to a range.
    #[error("Selection has no ranges")]
    NoRange,
}

/// Access to the host's native selection.
pub trait SelectionSource: Send + Sync + 'static {
    /// The current selection, `None` when nothing is selected.
    fn current_selection(&self) -> Result<Option<RawSelection>, SelectionError>;
}
