use crate::Frame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Result of [`FrameSlot::take`].
#[derive(Debug)]
pub enum Latest {
    /// A copy of the held frame.
    Frame(Frame),
    /// Nothing new to process yet.
    Pending,
    /// The slot was closed and its last frame has already been taken.
    Drained,
}

#[derive(Debug, Default)]
struct SlotState {
    frame: Option<Frame>,
    /// Sequence of the last frame handed out by `take`.
    taken: Option<u64>,
    closed: bool,
}

impl SlotState {
    fn is_taken(&self) -> bool {
        self.frame
            .as_ref()
            .map_or(true, |frame| self.taken == Some(frame.sequence()))
    }
}

/// Single-slot, latest-frame-wins hand-off between the frame producer and the tracking loop.
///
/// The slot holds at most one frame. Publishing replaces the held frame and releases the previous
/// buffer before the lock is dropped, so a released buffer can never be observed by a reader.
/// There is no queue and no blocking read: a reader that finds nothing new polls again.
///
/// A finite producer closes the slot after publishing its last frame; once that frame has been
/// taken, readers see [`Latest::Drained`].
///
/// # Examples
///
/// ```
/// use follow_track::{Frame, FrameSlot, Latest, PixelBuffer, PixelFormat};
///
/// let slot = FrameSlot::new();
/// assert!(matches!(slot.take(true), Latest::Pending));
///
/// let frame = Frame::new(1, 2, 2, PixelFormat::Gray8, PixelBuffer::from_vec(vec![0; 4])).unwrap();
/// slot.publish(frame);
/// slot.close();
///
/// match slot.take(true) {
///     Latest::Frame(latest) => assert_eq!(latest.sequence(), 1),
///     other => panic!("unexpected {other:?}"),
/// }
/// assert!(matches!(slot.take(true), Latest::Drained));
/// ```
#[derive(Debug, Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    taken: Condvar,
    published: AtomicU64,
}

impl FrameSlot {
    /// Returns a new, empty FrameSlot
    pub fn new() -> FrameSlot {
        FrameSlot::default()
    }

    // The slot only ever contains a whole frame, so a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `frame` as the latest frame, releasing any frame previously held.
    pub fn publish(&self, frame: Frame) {
        let mut state = self.lock();
        let previous = state.frame.replace(frame);
        drop(previous);
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy out the latest frame for processing.
    ///
    /// With `skip_taken`, a frame that was already handed out is not copied again and the call
    /// returns [`Latest::Pending`]. The returned frame carries its own copy of the pixel payload
    /// and stays valid after later publishes.
    pub fn take(&self, skip_taken: bool) -> Latest {
        let mut state = self.lock();

        if state.closed && state.is_taken() {
            return Latest::Drained;
        }
        if skip_taken && state.is_taken() {
            return Latest::Pending;
        }

        match state.frame.as_ref().cloned() {
            Some(frame) => {
                state.taken = Some(frame.sequence());
                self.taken.notify_all();
                Latest::Frame(frame)
            }
            None => Latest::Pending,
        }
    }

    /// Copy out the latest frame without marking it as taken. `None` until something is published.
    pub fn snapshot(&self) -> Option<Frame> {
        self.lock().frame.clone()
    }

    /// Returns whether no frame is held
    pub fn is_empty(&self) -> bool {
        self.lock().frame.is_none()
    }

    /// Wait up to `timeout` for the held frame to be taken.
    ///
    /// Returns whether the slot is empty or its frame has been taken.
    pub fn wait_taken(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .taken
            .wait_timeout_while(state, timeout, |state| !state.is_taken())
            .unwrap_or_else(PoisonError::into_inner);
        state.is_taken()
    }

    /// Mark the end of the stream: no frame will be published after this call.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    /// Returns whether the slot has been closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Release the held frame. Returns whether a frame was held.
    pub fn clear(&self) -> bool {
        self.lock().frame.take().is_some()
    }

    /// Returns the number of frames published over the slot's lifetime
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
