use crate::{BufferProvider, Error, Frame, FrameSlot, FrameSource, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const LOCKSTEP_POLL: Duration = Duration::from_millis(10);

/// Counters kept by the producer thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProducerStats {
    pub published: u64,
    pub read_failures: u64,
    pub allocation_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    read_failures: AtomicU64,
    allocation_failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ProducerStats {
        ProducerStats {
            published: self.published.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            allocation_failures: self.allocation_failures.load(Ordering::Relaxed),
        }
    }
}

/// Handle to the thread that captures frames and publishes them into a [`FrameSlot`].
#[derive(Debug)]
pub struct FrameProducer {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl FrameProducer {
    /// Spawn the producer thread.
    ///
    /// # Parameters
    ///
    /// * `source`: An opened frame source, moved to the producer thread.
    /// * `provider`: Supplies the buffer each captured frame is copied into.
    /// * `slot`: Receives every successfully captured frame.
    /// * `running`: The process wide run flag, the thread exits once it is cleared.
    /// * `lockstep`: Hold each capture until the previously published frame has been taken.
    ///
    /// A source reporting [`Error::EndOfStream`] closes the slot and ends the thread.
    pub fn spawn(
        mut source: Box<dyn FrameSource>,
        provider: Arc<dyn BufferProvider>,
        slot: Arc<FrameSlot>,
        running: Arc<AtomicBool>,
        lockstep: bool,
    ) -> Result<FrameProducer> {
        let counters = Arc::new(Counters::default());

        let handle = {
            let counters = counters.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("frame-producer".to_string())
                .spawn(move || {
                    log::info!(
                        "frame producer started: source={} provider={}",
                        source.name(),
                        provider.name()
                    );

                    let mut sequence = 0u64;
                    while running.load(Ordering::Acquire) {
                        if lockstep && !slot.wait_taken(LOCKSTEP_POLL) {
                            continue;
                        }

                        match capture(source.as_mut(), provider.as_ref(), sequence) {
                            Ok(frame) => {
                                slot.publish(frame);
                                sequence += 1;
                                counters.published.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(Error::EndOfStream) => {
                                log::info!("frame source {} exhausted", source.name());
                                slot.close();
                                break;
                            }
                            Err(Error::Allocation(reason)) => {
                                log::warn!("frame buffer allocation failed: {reason}");
                                counters.allocation_failures.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(err) => {
                                log::warn!("frame capture failed: {err}");
                                counters.read_failures.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }

                    log::info!("frame producer stopped after {sequence} frames");
                })
                .map_err(|source| Error::ThreadSpawn {
                    name: "frame-producer",
                    source,
                })?
        };

        Ok(FrameProducer {
            handle,
            running,
            counters,
        })
    }

    /// Returns the counters as of now
    pub fn stats(&self) -> ProducerStats {
        self.counters.snapshot()
    }

    /// Returns whether the producer thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Clear the run flag and wait for the producer thread to exit.
    pub fn stop_and_join(self) -> Result<ProducerStats> {
        self.running.store(false, Ordering::Release);
        self.handle.join().map_err(|_| Error::ProducerPanicked)?;
        Ok(self.counters.snapshot())
    }
}

/// Read one frame from `source` and copy it into a buffer from `provider`.
fn capture(
    source: &mut dyn FrameSource,
    provider: &dyn BufferProvider,
    sequence: u64,
) -> Result<Frame> {
    let image = source.read_frame()?;

    let mut buffer = provider.allocate(image.data.len())?;
    buffer.as_mut_slice().copy_from_slice(&image.data);

    Frame::new(sequence, image.width, image.height, image.format, buffer)
}
