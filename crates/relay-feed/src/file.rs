//! File-backed frame producer.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::FeedError;
use crate::feed::VideoFeed;
use crate::{FeedResult, DEFAULT_CHUNK_INTERVAL_MS, DEFAULT_CHUNK_SIZE};

/// Pacing for a [`FileFeed`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileFeedConfig {
    /// Bytes per delivered frame.
    pub chunk_size: usize,

    /// Pause between frames in milliseconds.
    pub interval_ms: u64,

    /// Rewind and keep going at end of input.
    pub looping: bool,
}

impl Default for FileFeedConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            interval_ms: DEFAULT_CHUNK_INTERVAL_MS,
            looping: false,
        }
    }
}

trait Input: Read + Seek + Send {}
impl<T: Read + Seek + Send> Input for T {}

/// Reads an input in fixed-size chunks on its own thread and delivers
/// each chunk to a [`VideoFeed`].
///
/// The read buffer is reused between chunks, the way a device SDK reuses
/// its decode buffer, and the last chunk of a pass is usually shorter
/// than the buffer.
pub struct FileFeed {
    input: Option<Box<dyn Input>>,
    feed: Arc<VideoFeed>,
    config: FileFeedConfig,
    should_stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<FeedResult<u64>>>,
}

impl FileFeed {
    /// Open a file as the frame input.
    pub fn open(path: impl AsRef<Path>, feed: Arc<VideoFeed>, config: FileFeedConfig) -> FeedResult<Self> {
        let file = File::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "Opened feed input");
        Ok(Self::from_reader(file, feed, config))
    }

    /// Use any seekable reader as the frame input.
    pub fn from_reader<R>(reader: R, feed: Arc<VideoFeed>, config: FileFeedConfig) -> Self
    where
        R: Read + Seek + Send + 'static,
    {
        Self {
            input: Some(Box::new(reader)),
            feed,
            config,
            should_stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Start the producer thread.
    #[instrument(name = "file_feed_start", skip(self))]
    pub fn start(&mut self) -> FeedResult<()> {
        if self.thread.is_some() {
            return Err(FeedError::AlreadyRunning);
        }
        let input = self.input.take().ok_or(FeedError::AlreadyRunning)?;

        let feed = Arc::clone(&self.feed);
        let config = self.config.clone();
        let should_stop = Arc::clone(&self.should_stop);
        should_stop.store(false, Ordering::SeqCst);

        info!(
            chunk_size = config.chunk_size,
            interval_ms = config.interval_ms,
            "Starting file feed"
        );

        let handle = thread::Builder::new()
            .name("file-feed".to_string())
            .spawn(move || pump(input, &feed, &config, &should_stop))?;

        self.thread = Some(handle);
        Ok(())
    }

    /// Signal the producer to stop and wait for it.
    ///
    /// Returns the number of frames delivered.
    #[instrument(name = "file_feed_stop", skip(self))]
    pub fn stop(&mut self) -> FeedResult<u64> {
        self.should_stop.store(true, Ordering::SeqCst);
        self.join()
    }

    /// Wait for the producer to reach the end of its input.
    ///
    /// Never returns for a looping feed unless [`FileFeed::stop`] is
    /// called from another thread.
    pub fn wait(&mut self) -> FeedResult<u64> {
        self.join()
    }

    /// Returns true while the producer thread is alive.
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn join(&mut self) -> FeedResult<u64> {
        let handle = self.thread.take().ok_or(FeedError::NotRunning)?;
        let delivered = handle.join().map_err(|_| FeedError::ThreadPanicked)??;
        info!(delivered, "File feed stopped");
        Ok(delivered)
    }
}

impl Drop for FileFeed {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.stop();
        }
    }
}

fn pump(
    mut input: Box<dyn Input>,
    feed: &VideoFeed,
    config: &FileFeedConfig,
    should_stop: &AtomicBool,
) -> FeedResult<u64> {
    let mut buffer = vec![0u8; config.chunk_size.max(1)];
    let interval = Duration::from_millis(config.interval_ms);
    let mut delivered = 0u64;
    let mut delivered_this_pass = 0u64;

    while !should_stop.load(Ordering::SeqCst) {
        let len = read_chunk(&mut input, &mut buffer)?;

        if len == 0 {
            if config.looping && delivered_this_pass > 0 {
                debug!(delivered_this_pass, "Rewinding feed input");
                input.seek(SeekFrom::Start(0))?;
                delivered_this_pass = 0;
                continue;
            }
            break;
        }

        match feed.deliver(&buffer, len) {
            Ok(_) => {
                delivered += 1;
                delivered_this_pass += 1;
            }
            Err(FeedError::Closed) => {
                warn!("Feed closed under the producer");
                break;
            }
            Err(e) => return Err(e),
        }

        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }

    Ok(delivered)
}

/// Fill `buffer` as far as the input allows. Returns bytes read; short
/// only at end of input.
fn read_chunk(input: &mut dyn Input, buffer: &mut [u8]) -> FeedResult<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match input.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FrameListener, FrameSource};
    use crate::frame::Frame;
    use parking_lot::Mutex;
    use rstest::rstest;
    use std::io::{Cursor, Write};

    fn collect(feed: &VideoFeed) -> Arc<Mutex<Vec<usize>>> {
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sizes);
        let listener: FrameListener = Arc::new(move |frame: Frame<'_>| sink.lock().push(frame.len()));
        feed.subscribe(listener).unwrap();
        sizes
    }

    #[rstest]
    #[case(1000, 188, vec![188, 188, 188, 188, 188, 60])]
    #[case(1316, 1316, vec![1316])]
    #[case(10, 64, vec![10])]
    fn test_chunks_input(#[case] input_len: usize, #[case] chunk_size: usize, #[case] expected: Vec<usize>) {
        let feed = Arc::new(VideoFeed::new());
        let sizes = collect(&feed);

        let config = FileFeedConfig {
            chunk_size,
            interval_ms: 0,
            looping: false,
        };
        let mut file_feed = FileFeed::from_reader(Cursor::new(vec![0xABu8; input_len]), Arc::clone(&feed), config);
        file_feed.start().unwrap();

        assert_eq!(file_feed.wait().unwrap(), expected.len() as u64);
        assert_eq!(*sizes.lock(), expected);
    }

    #[test]
    fn test_looping_feed_runs_until_stopped() {
        let feed = Arc::new(VideoFeed::new());
        let sizes = collect(&feed);

        let config = FileFeedConfig {
            chunk_size: 4,
            interval_ms: 1,
            looping: true,
        };
        let mut file_feed = FileFeed::from_reader(Cursor::new(vec![1u8; 6]), Arc::clone(&feed), config);
        file_feed.start().unwrap();

        while sizes.lock().len() < 5 {
            thread::sleep(Duration::from_millis(1));
        }
        let delivered = file_feed.stop().unwrap();

        assert!(delivered >= 5);
        assert_eq!(&sizes.lock()[..4], &[4, 2, 4, 2]);
    }

    #[test]
    fn test_looping_empty_input_terminates() {
        let feed = Arc::new(VideoFeed::new());
        let config = FileFeedConfig {
            looping: true,
            ..Default::default()
        };
        let mut file_feed = FileFeed::from_reader(Cursor::new(Vec::new()), feed, config);
        file_feed.start().unwrap();

        assert_eq!(file_feed.wait().unwrap(), 0);
    }

    #[test]
    fn test_open_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[9u8; 376]).unwrap();
        file.flush().unwrap();

        let feed = Arc::new(VideoFeed::new());
        let sizes = collect(&feed);
        let config = FileFeedConfig {
            chunk_size: 188,
            interval_ms: 0,
            looping: false,
        };

        let mut file_feed = FileFeed::open(file.path(), Arc::clone(&feed), config).unwrap();
        file_feed.start().unwrap();
        assert!(matches!(file_feed.start(), Err(FeedError::AlreadyRunning)));

        assert_eq!(file_feed.wait().unwrap(), 2);
        assert_eq!(*sizes.lock(), vec![188, 188]);
    }

    #[test]
    fn test_open_missing_file() {
        let feed = Arc::new(VideoFeed::new());
        let result = FileFeed::open("/definitely/not/here.h264", feed, FileFeedConfig::default());
        assert!(matches!(result, Err(FeedError::Io(_))));
    }
}
