use follow_track::{CapturedImage, Error, FrameSource, PixelFormat, Result};
use image::imageops::{self, FilterType};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// Replays image files matched by a glob pattern as a camera would deliver them.
///
/// Every image is decoded to RGB and resized to the size requested in `open`. When the sequence
/// is exhausted it either starts over or reports [`Error::EndOfStream`].
pub struct ImageSequenceSource {
    pattern: String,
    files: Vec<PathBuf>,
    cursor: usize,
    size: Option<(u32, u32)>,
    looping: bool,
    interval: Option<Duration>,
    last_read: Option<Instant>,
}

impl ImageSequenceSource {
    pub fn new<S: Into<String>>(pattern: S) -> ImageSequenceSource {
        ImageSequenceSource {
            pattern: pattern.into(),
            files: vec![],
            cursor: 0,
            size: None,
            looping: false,
            interval: None,
            last_read: None,
        }
    }

    /// Restart from the first file when the sequence ends
    pub fn with_looping(&mut self, looping: bool) -> &mut Self {
        self.looping = looping;
        self
    }

    /// Deliver at most `fps` frames per second
    pub fn with_fps(&mut self, fps: Option<u32>) -> &mut Self {
        self.interval = fps.filter(|fps| *fps > 0).map(|fps| Duration::from_secs(1) / fps);
        self
    }

    /// Returns the files resolved by `open`
    pub fn files(&self) -> &[PathBuf] {
        &self.files
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

    fn next_path(&mut self) -> Result<PathBuf> {
        if self.cursor >= self.files.len() {
            if !self.looping {
                return Err(Error::EndOfStream);
            }
            self.cursor = 0;
        }

        let path = self.files[self.cursor].clone();
        self.cursor += 1;
        Ok(path)
    }
}

impl FrameSource for ImageSequenceSource {
    fn name(&self) -> &str {
        "image-sequence"
    }

    fn open(&mut self, width: u32, height: u32) -> Result<()> {
        let paths = glob::glob(&self.pattern)
            .map_err(|err| Error::acquisition(format!("invalid pattern {}: {err}", self.pattern)))?;

        let mut files = paths.filter_map(|path| path.ok()).collect::<Vec<_>>();
        files.sort();

        if files.is_empty() {
            return Err(Error::acquisition(format!(
                "no images match {}",
                self.pattern
            )));
        }

        log::info!(
            "ImageSequenceSource: {} images match {}",
            files.len(),
            self.pattern
        );
        self.files = files;
        self.cursor = 0;
        self.size = Some((width, height));
        Ok(())
    }

    fn read_frame(&mut self) -> Result<CapturedImage> {
        let (width, height) = self
            .size
            .ok_or_else(|| Error::acquisition("image sequence is not open"))?;

        let path = self.next_path()?;
        self.pace();

        let image = image::io::Reader::open(&path)
            .map_err(|err| Error::acquisition(format!("{}: {err}", path.display())))?
            .decode()
            .map_err(|err| Error::acquisition(format!("{}: {err}", path.display())))?
            .to_rgb8();

        let image = if image.dimensions() == (width, height) {
            image
        } else {
            imageops::resize(&image, width, height, FilterType::Triangle)
        };

        Ok(CapturedImage {
            width,
            height,
            format: PixelFormat::Rgb888,
            data: image.into_raw(),
        })
    }
}
