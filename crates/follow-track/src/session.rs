use crate::{
    Detector, FollowConfig, FrameProducer, FrameSlot, FrameSource, Pipeline, PipelineStats,
    ProducerStats, Reporter, Result,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a finished session did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub pipeline: PipelineStats,
    pub producer: ProducerStats,
    /// False when the detector failed to release its resources.
    pub detector_released: bool,
}

/// Run the whole follow pipeline until `running` is cleared or the configured frame limit is hit.
/// A finite source also ends the session once its last frame has been processed.
///
/// Startup happens in order: open the source, start the producer, load the detector. A failure
/// at any step is returned after everything acquired before it has been released. Shutdown clears
/// `running`, joins the producer, releases the last published frame and finally the detector.
///
/// # Parameters
///
/// * `config`: Validated tunables.
/// * `source`: An unopened frame source.
/// * `load_detector`: Loads the model, called once the producer is running.
/// * `reporter`: Receives one report per processed frame.
/// * `running`: Process wide run flag, shared with the producer and any signal handler.
pub fn run_session<D, R, L>(
    config: &FollowConfig,
    mut source: Box<dyn FrameSource>,
    load_detector: L,
    reporter: R,
    running: Arc<AtomicBool>,
) -> Result<SessionSummary>
where
    D: Detector,
    R: Reporter,
    L: FnOnce() -> Result<D>,
{
    config.validate()?;
    let selector = config.selector()?;

    source.open(config.frame.width, config.frame.height)?;
    log::info!(
        "opened {} source at {}x{}",
        source.name(),
        config.frame.width,
        config.frame.height
    );

    let slot = Arc::new(FrameSlot::new());
    let producer = FrameProducer::spawn(
        source,
        config.buffer_provider(),
        slot.clone(),
        running.clone(),
        config.pipeline.lockstep,
    )?;

    let detector = match load_detector() {
        Ok(detector) => detector,
        Err(err) => {
            log::error!("detector failed to load: {err}");
            if let Err(join_err) = producer.stop_and_join() {
                log::error!("{join_err}");
            }
            slot.clear();
            return Err(err);
        }
    };
    log::info!("detector {} loaded", detector.name());

    let mut pipeline = Pipeline::new(
        slot.clone(),
        detector,
        selector,
        config.tracker(),
        reporter,
    );
    pipeline
        .with_idle(config.idle_strategy())
        .with_max_frames(config.pipeline.max_frames)
        .with_skip_stale(config.pipeline.skip_stale);

    let pipeline_stats = pipeline.run(&running);

    running.store(false, Ordering::Release);
    let producer_result = producer.stop_and_join();

    if slot.clear() {
        log::debug!("released last published frame");
    }

    let detector_released = match pipeline.detector_mut().release() {
        Ok(()) => true,
        Err(err) => {
            log::error!("{err}");
            false
        }
    };

    let producer_stats = producer_result?;
    log::info!(
        "session finished: published={} processed={} read_failures={} allocation_failures={}",
        producer_stats.published,
        pipeline_stats.processed,
        producer_stats.read_failures,
        producer_stats.allocation_failures
    );

    Ok(SessionSummary {
        pipeline: pipeline_stats,
        producer: producer_stats,
        detector_released,
    })
}
