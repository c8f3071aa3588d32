use crate::{Error, PixelFormat, Result};
use std::thread;
use std::time::{Duration, Instant};

/// Pixels read from a frame source, before they are copied into a provider buffer.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

/// The frame acquisition collaborator.
///
/// `open` is called once on the startup thread; the opened source is then moved to the producer
/// thread, which calls `read_frame` until shutdown.
pub trait FrameSource: Send {
    /// Source identifier used in logs.
    fn name(&self) -> &str;

    /// Open the device, requesting frames of `width` x `height`.
    fn open(&mut self, width: u32, height: u32) -> Result<()>;

    /// Read the next frame.
    ///
    /// A finite source returns [`Error::EndOfStream`] once it has delivered its last frame.
    fn read_frame(&mut self) -> Result<CapturedImage>;
}

/// Generates gradient frames, optionally paced to a frame rate.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    format: PixelFormat,
    size: Option<(u32, u32)>,
    interval: Option<Duration>,
    last_read: Option<Instant>,
    /// Every n-th read fails, simulating a flaky device.
    fail_every: Option<u64>,
    fail_open: bool,
    /// Frames delivered before the source reports the end of the stream.
    frame_limit: Option<u64>,
    reads: u64,
    delivered: u64,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(PixelFormat::Rgb888)
    }
}

impl SyntheticSource {
    /// Returns a new SyntheticSource producing frames as fast as they are read
    pub fn new(format: PixelFormat) -> SyntheticSource {
        SyntheticSource {
            format,
            size: None,
            interval: None,
            last_read: None,
            fail_every: None,
            fail_open: false,
            frame_limit: None,
            reads: 0,
            delivered: 0,
        }
    }

    /// Pace reads to `fps` frames per second
    pub fn with_fps(&mut self, fps: u32) -> &mut Self {
        self.interval = (fps > 0).then(|| Duration::from_secs(1) / fps);
        self
    }

    /// Fail every `n`-th read
    pub fn with_fail_every(&mut self, n: u64) -> &mut Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    /// Make `open` fail
    pub fn with_fail_open(&mut self, fail_open: bool) -> &mut Self {
        self.fail_open = fail_open;
        self
    }

    /// End the stream after `frames` delivered frames
    pub fn with_frame_limit(&mut self, frames: u64) -> &mut Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Returns the number of reads attempted
    pub fn reads(&self) -> u64 {
        self.reads
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last_read)) = (self.interval, self.last_read) {
            let elapsed = last_read.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_read = Some(Instant::now());
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open(&mut self, width: u32, height: u32) -> Result<()> {
        if self.fail_open {
            return Err(Error::acquisition("synthetic device refused to open"));
        }
        if width == 0 || height == 0 {
            return Err(Error::acquisition(format!(
                "unsupported capture size {width}x{height}"
            )));
        }

        self.size = Some((width, height));
        log::info!("SyntheticSource: opened {width}x{height} {:?}", self.format);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<CapturedImage> {
        let (width, height) = self
            .size
            .ok_or_else(|| Error::acquisition("synthetic source is not open"))?;

        if self.frame_limit.map_or(false, |limit| self.delivered >= limit) {
            return Err(Error::EndOfStream);
        }

        self.pace();
        self.reads += 1;

        if let Some(n) = self.fail_every {
            if self.reads % n == 0 {
                return Err(Error::acquisition(format!("synthetic read {} dropped", self.reads)));
            }
        }

        let data = (0..self.format.frame_size(width, height))
            .map(|i| ((i as u64 + self.reads) % 256) as u8)
            .collect();

        self.delivered += 1;
        Ok(CapturedImage {
            width,
            height,
            format: self.format,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn read_requires_open() {
        let mut source = SyntheticSource::default();
        assert!(matches!(source.read_frame(), Err(Error::Acquisition(_))));
    }

    #[test]
    fn reads_sized_frames() {
        let mut source = SyntheticSource::new(PixelFormat::Gray8);
        source.open(4, 3).unwrap();

        let image = source.read_frame().unwrap();
        assert_eq!((image.width, image.height), (4, 3));
        assert_eq!(image.data.len(), 12);
        assert_eq!(image.data[0], 1);
    }

    #[test]
    fn scripted_failures() {
        let mut source = SyntheticSource::new(PixelFormat::Gray8);
        source.with_fail_every(3).open(2, 2).unwrap();

        let results = (0..6).map(|_| source.read_frame().is_ok()).collect::<Vec<_>>();
        itertools::assert_equal(results, [true, true, false, true, true, false]);

        let mut source = SyntheticSource::default();
        source.with_fail_open(true);
        assert!(matches!(source.open(640, 480), Err(Error::Acquisition(_))));
    }

    #[test]
    fn frame_limit_ends_stream() {
        let mut source = SyntheticSource::new(PixelFormat::Gray8);
        source.with_frame_limit(2).with_fail_every(2).open(2, 2).unwrap();

        // failed reads do not count towards the limit
        assert!(source.read_frame().is_ok());
        assert!(matches!(source.read_frame(), Err(Error::Acquisition(_))));
        assert!(source.read_frame().is_ok());
        assert!(matches!(source.read_frame(), Err(Error::EndOfStream)));
        assert!(matches!(source.read_frame(), Err(Error::EndOfStream)));
        assert_eq!(source.reads(), 3);
    }
}
