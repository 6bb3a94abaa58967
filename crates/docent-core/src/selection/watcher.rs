use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::source::{HostEvent, SelectionSource};
use crate::config::SelectionConfig;

/// Distance in pixels between the top of the selection and the affordance.
pub const ANCHOR_OFFSET: f64 = 45.0;

/// Page coordinates of the affordance, centered above the selection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorPosition {
    pub x: f64,
    pub y: f64,
}

/// A qualifying selection, ready to be attached to the next question.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionContext {
    pub text: String,
    pub anchor: AnchorPosition,
}

impl SelectionContext {
    pub fn new(text: impl Into<String>, anchor: AnchorPosition) -> Self {
        Self {
            text: text.into(),
            anchor,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SelectionUpdate {
    /// Show the affordance for this selection.
    Selected(SelectionContext),
    /// Hide the affordance.
    Cleared,
}

type Current = Arc<Mutex<Option<SelectionContext>>>;

/// Turns host pointer and scroll events into debounced selection updates.
///
/// Requires a tokio runtime once started; the debounce timer lives in a
/// spawned task that is aborted by [`SelectionWatcher::stop`] or on drop.
pub struct SelectionWatcher {
    source: Arc<dyn SelectionSource>,
    config: SelectionConfig,
    current: Current,
    events_tx: Option<mpsc::UnboundedSender<HostEvent>>,
    updates_rx: Option<mpsc::UnboundedReceiver<SelectionUpdate>>,
    task: Option<JoinHandle<()>>,
}

impl SelectionWatcher {
    pub fn new(source: Arc<dyn SelectionSource>, config: SelectionConfig) -> Self {
        Self {
            source,
            config,
            current: Arc::new(Mutex::new(None)),
            events_tx: None,
            updates_rx: None,
            task: None,
        }
    }

    /// Begin a fresh sequence of updates. Restarts the watcher if it is running.
    pub fn start(&mut self) {
        self.stop();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(watch(
            events_rx,
            updates_tx,
            self.source.clone(),
            self.config.clone(),
            self.current.clone(),
        ));

        self.events_tx = Some(events_tx);
        self.updates_rx = Some(updates_rx);
        self.task = Some(task);
        debug!(
            debounce_ms = self.config.debounce_ms,
            min_length = self.config.min_length,
            "Selection watcher started"
        );
    }

    /// Deregister from host events and cancel any pending debounce.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Selection watcher stopped");
        }
        self.events_tx = None;
        self.updates_rx = None;
        self.current.lock().take();
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Forward a host event. Ignored while stopped.
    pub fn notify(&self, event: HostEvent) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(event);
        }
    }

    /// A sender the host can move into its own event handlers.
    pub fn host_events(&self) -> Option<mpsc::UnboundedSender<HostEvent>> {
        self.events_tx.clone()
    }

    /// The next update, or `None` once the watcher is stopped.
    pub async fn next(&mut self) -> Option<SelectionUpdate> {
        self.updates_rx.as_mut()?.recv().await
    }

    /// Non-blocking variant of [`SelectionWatcher::next`].
    pub fn try_next(&mut self) -> Option<SelectionUpdate> {
        self.updates_rx.as_mut()?.try_recv().ok()
    }

    /// The selection behind the visible affordance, if any.
    pub fn current(&self) -> Option<SelectionContext> {
        self.current.lock().clone()
    }

    /// Consume the selection (the "ask" click). The affordance is hidden;
    /// clearing the native selection is up to the host.
    pub fn take_selection(&self) -> Option<SelectionContext> {
        self.current.lock().take()
    }
}

impl Drop for SelectionWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn watch(
    mut events: mpsc::UnboundedReceiver<HostEvent>,
    updates: mpsc::UnboundedSender<SelectionUpdate>,
    source: Arc<dyn SelectionSource>,
    config: SelectionConfig,
    current: Current,
) {
    let debounce = tokio::time::sleep(config.debounce());
    tokio::pin!(debounce);
    let mut armed = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(HostEvent::PointerUp) => {
                    // Restart the timer so a drag only evaluates once it settles
                    debounce.as_mut().reset(Instant::now() + config.debounce());
                    armed = true;
                }
                Some(HostEvent::Scroll) => {
                    armed = false;
                    if current.lock().take().is_some() {
                        trace!("Selection cleared by scroll");
                        let _ = updates.send(SelectionUpdate::Cleared);
                    }
                }
                None => break,
            },
            () = &mut debounce, if armed => {
                armed = false;
                let update = match evaluate(source.as_ref(), config.min_length) {
                    Some(context) => {
                        *current.lock() = Some(context.clone());
                        Some(SelectionUpdate::Selected(context))
                    }
                    None => current.lock().take().map(|_| SelectionUpdate::Cleared),
                };
                if let Some(update) = update {
                    if updates.send(update).is_err() {
                        break;
                    }
                }
            }
        }
    }
}

fn evaluate(source: &dyn SelectionSource, min_length: usize) -> Option<SelectionContext> {
    let raw = match source.current_selection() {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            debug!(error = %e, "Selection query failed, treating as no selection");
            return None;
        }
    };

    let text = raw.text.trim();
    let length = text.chars().count();
    if length < min_length {
        trace!(length, min_length, "Selection too short");
        return None;
    }

    Some(SelectionContext::new(
        text,
        AnchorPosition {
            x: raw.rect.left + raw.rect.width / 2.0,
            y: raw.rect.top + raw.scroll_y - ANCHOR_OFFSET,
        },
    ))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::selection::source::{RawSelection, SelectionError, SelectionRect};

    /// Host selection that tests can change between events.
    #[derive(Default)]
    struct FakeSelection {
        text: Mutex<Option<String>>,
        failure: Mutex<Option<SelectionError>>,
    }

    impl FakeSelection {
        fn select(&self, text: &str) {
            *self.text.lock() = Some(text.to_string());
        }
    }

    impl SelectionSource for FakeSelection {
        fn current_selection(&self) -> Result<Option<RawSelection>, SelectionError> {
            if let Some(error) = self.failure.lock().clone() {
                return Err(error);
            }
            Ok(self.text.lock().clone().map(|text| RawSelection {
                text,
                rect: SelectionRect {
                    top: 200.0,
                    left: 100.0,
                    width: 300.0,
                    height: 18.0,
                },
                scroll_y: 1000.0,
            }))
        }
    }

    fn watcher(source: Arc<FakeSelection>) -> SelectionWatcher {
        let mut watcher = SelectionWatcher::new(source, SelectionConfig::default());
        watcher.start();
        watcher
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(400)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimum_length_boundary() {
        let source = Arc::new(FakeSelection::default());
        let mut watcher = watcher(source.clone());

        source.select("nineteen characters");
        assert_eq!("nineteen characters".chars().count(), 19);
        watcher.notify(HostEvent::PointerUp);
        settle().await;
        assert_eq!(watcher.try_next(), None);
        assert_eq!(watcher.current(), None);

        source.select("  exactly twenty chars  ");
        watcher.notify(HostEvent::PointerUp);
        let update = watcher.next().await;
        assert_eq!(
            update,
            Some(SelectionUpdate::Selected(SelectionContext::new(
                "exactly twenty chars",
                AnchorPosition {
                    x: 250.0,
                    y: 1155.0
                }
            )))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_waits_for_pointer_to_settle() {
        let source = Arc::new(FakeSelection::default());
        source.select("Bipedal locomotion requires balance control");
        let mut watcher = watcher(source);

        watcher.notify(HostEvent::PointerUp);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(watcher.try_next(), None);

        watcher.notify(HostEvent::PointerUp);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(watcher.try_next(), None);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(matches!(
            watcher.try_next(),
            Some(SelectionUpdate::Selected(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_cancels_pending_and_clears_visible() {
        let source = Arc::new(FakeSelection::default());
        source.select("Bipedal locomotion requires balance control");
        let mut watcher = watcher(source);

        watcher.notify(HostEvent::PointerUp);
        tokio::time::sleep(Duration::from_millis(100)).await;
        watcher.notify(HostEvent::Scroll);
        settle().await;
        assert_eq!(watcher.try_next(), None);

        watcher.notify(HostEvent::PointerUp);
        assert!(matches!(
            watcher.next().await,
            Some(SelectionUpdate::Selected(_))
        ));

        watcher.notify(HostEvent::Scroll);
        assert_eq!(watcher.next().await, Some(SelectionUpdate::Cleared));
        assert_eq!(watcher.current(), None);

        // Already hidden, no second clear
        watcher.notify(HostEvent::Scroll);
        settle().await;
        assert_eq!(watcher.try_next(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_selection_hides_visible_affordance() {
        let source = Arc::new(FakeSelection::default());
        source.select("Bipedal locomotion requires balance control");
        let mut watcher = watcher(source.clone());

        watcher.notify(HostEvent::PointerUp);
        assert!(matches!(
            watcher.next().await,
            Some(SelectionUpdate::Selected(_))
        ));

        source.select("short");
        watcher.notify(HostEvent::PointerUp);
        assert_eq!(watcher.next().await, Some(SelectionUpdate::Cleared));
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_error_means_no_selection() {
        let source = Arc::new(FakeSelection::default());
        source.select("Bipedal locomotion requires balance control");
        let mut watcher = watcher(source.clone());

        *source.failure.lock() = Some(SelectionError::NoRange);
        watcher.notify(HostEvent::PointerUp);
        settle().await;
        assert_eq!(watcher.try_next(), None);
        assert!(watcher.is_running());

        let detached = SelectionError::Unavailable("detached document".to_string());
        *source.failure.lock() = Some(detached);
        watcher.notify(HostEvent::PointerUp);
        settle().await;
        assert_eq!(watcher.try_next(), None);
        assert_eq!(watcher.current(), None);

        // Recovers once the host can read the selection again
        *source.failure.lock() = None;
        watcher.notify(HostEvent::PointerUp);
        assert!(matches!(watcher.next().await, Some(SelectionUpdate::Selected(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_selection_consumes_context() {
        let source = Arc::new(FakeSelection::default());
        source.select("Bipedal locomotion requires balance control");
        let mut watcher = watcher(source);

        watcher.notify(HostEvent::PointerUp);
        watcher.next().await;

        let taken = watcher.take_selection().unwrap();
        assert_eq!(taken.text, "Bipedal locomotion requires balance control");
        assert_eq!(watcher.take_selection(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_sequence_and_restart_is_fresh() {
        let source = Arc::new(FakeSelection::default());
        source.select("Bipedal locomotion requires balance control");
        let mut watcher = watcher(source);

        watcher.notify(HostEvent::PointerUp);
        watcher.stop();
        assert_eq!(watcher.next().await, None);
        assert!(!watcher.is_running());

        watcher.start();
        watcher.notify(HostEvent::PointerUp);
        assert!(matches!(
            watcher.next().await,
            Some(SelectionUpdate::Selected(_))
        ));
    }
}
