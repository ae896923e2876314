//! Capture listener
//!
//! Reads key input from a relay (stdin, a file or a FIFO written by an
//! input hook), feeds it through the keyword matcher and records every
//! event in the counter store. Runs on its own OS thread.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::counters::CounterStore;
use super::keywords::{InputEvent, KeywordMatcher};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Cannot open input relay {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("Input read failed: {0}")]
    Read(#[from] io::Error),

    #[error("Cannot start capture thread: {0}")]
    Spawn(io::Error),
}

/// Where key input comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    Stdin,
    Relay(PathBuf),
    Disabled,
}

impl CaptureSource {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "stdin" | "-" => Self::Stdin,
            v if v.eq_ignore_ascii_case("none") => Self::Disabled,
            path => Self::Relay(PathBuf::from(path)),
        }
    }

    fn open(&self) -> Result<Option<Box<dyn BufRead + Send>>, CaptureError> {
        match self {
            Self::Stdin => Ok(Some(Box::new(BufReader::new(io::stdin())))),
            Self::Relay(path) => {
                let file = File::open(path).map_err(|source| CaptureError::Open {
                    path: path.clone(),
                    source,
                })?;
                Ok(Some(Box::new(BufReader::new(file))))
            }
            Self::Disabled => Ok(None),
        }
    }
}

impl std::fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdin => write!(f, "stdin"),
            Self::Relay(path) => write!(f, "{}", path.display()),
            Self::Disabled => write!(f, "none"),
        }
    }
}

/// Drain `reader` into the store until EOF or `stop` is set.
/// Returns the number of events recorded.
pub fn run_listener<R: BufRead>(
    mut reader: R,
    mut matcher: KeywordMatcher,
    store: &CounterStore,
    stop: &AtomicBool,
) -> Result<u64, CaptureError> {
    let mut line = Vec::new();
    let mut events = 0u64;

    while !stop.load(Ordering::Relaxed) {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }

        for c in String::from_utf8_lossy(&line).chars() {
            let flagged = matcher.feed(InputEvent::from_char(c));
            store.record_event(flagged);
            events += 1;
        }
    }

    Ok(events)
}

/// Running capture thread
pub struct CaptureHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl CaptureHandle {
    /// Ask the listener to stop and join it if it exits within `grace`.
    /// A thread still blocked on input (an idle terminal) is left detached.
    pub fn shutdown(self, grace: Duration) {
        self.stop.store(true, Ordering::Relaxed);

        let deadline = Instant::now() + grace;
        while !self.thread.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }

        if self.thread.is_finished() {
            if self.thread.join().is_err() {
                log::error!("Capture thread panicked");
            }
        } else {
            log::debug!("Capture thread blocked on input; detaching");
        }
    }
}

/// Start the listener thread. `Ok(None)` when capture is disabled.
pub fn spawn_listener(
    source: CaptureSource,
    matcher: KeywordMatcher,
    store: Arc<CounterStore>,
) -> Result<Option<CaptureHandle>, CaptureError> {
    let reader = match source.open()? {
        Some(reader) => reader,
        None => {
            log::info!("Input capture disabled");
            return Ok(None);
        }
    };

    log::info!(
        "Capturing input from {} ({} keywords)",
        source,
        matcher.keyword_count()
    );

    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);

    let thread = thread::Builder::new()
        .name("capture".to_string())
        .spawn(move || match run_listener(reader, matcher, &store, &thread_stop) {
            Ok(events) => log::info!("Input relay closed after {} events", events),
            Err(e) => log::error!("Capture stopped: {}", e),
        })
        .map_err(CaptureError::Spawn)?;

    Ok(Some(CaptureHandle { stop, thread }))
}
