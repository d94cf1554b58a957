//! Shared fixtures for the integration tests.
//!
//! Pages are tiny grayscale PNGs. The scripted session reads the gray value
//! of the first pixel to decide what to do, so a test controls each task's
//! behavior through the file it submits.

#![allow(dead_code)]

use oar_ocr_pool::prelude::*;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Gray value that makes the session return an inference error.
pub const FAIL: u8 = 200;
/// Gray value that makes the session block forever.
pub const HANG: u8 = 255;

pub fn png(value: u8) -> Vec<u8> {
    let image = image::GrayImage::from_pixel(4, 3, image::Luma([value]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}

/// A page whose recognized text will be `page-{value}`.
pub fn page(index: usize, value: u8) -> InputFile {
    InputFile::from_bytes(format!("page_{index}.png"), png(value))
}

pub fn pages(count: usize) -> Vec<InputFile> {
    (0..count).map(|i| page(i, i as u8)).collect()
}

pub fn corrupt(index: usize) -> InputFile {
    InputFile::from_bytes(format!("page_{index}.png"), b"not an image".to_vec())
}

/// Counters shared by every session a factory opens.
#[derive(Debug, Default)]
pub struct Tally {
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    pub sessions: AtomicUsize,
    pub cleanups: AtomicUsize,
}

impl Tally {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

pub struct ScriptedSession {
    tally: Arc<Tally>,
    delay: Duration,
}

impl InferenceSession for ScriptedSession {
    fn infer(&mut self, buffer: &PixelBuffer) -> Result<RecognitionResult, InferenceError> {
        let value = buffer.samples().first().copied().unwrap_or(0);
        let active = self.tally.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.tally.peak.fetch_max(active, Ordering::SeqCst);

        if value == HANG {
            loop {
                thread::park();
            }
        }

        thread::sleep(self.delay);
        self.tally.active.fetch_sub(1, Ordering::SeqCst);

        if value == FAIL {
            return Err(InferenceError::new("engine rejected page"));
        }
        Ok(RecognitionResult::new(format!("page-{value}"), 91.5))
    }

    fn release_caches(&mut self) {
        self.tally.cleanups.fetch_add(1, Ordering::SeqCst);
    }

    fn engine_info(&self) -> String {
        "scripted session".to_string()
    }
}

/// A session that recognizes nothing.
pub struct NullSession;

impl InferenceSession for NullSession {
    fn infer(&mut self, _buffer: &PixelBuffer) -> Result<RecognitionResult, InferenceError> {
        Ok(RecognitionResult::new("", 0.0))
    }
}

/// Recognizes pages like `ScriptedSession` but panics whenever it is asked to
/// release its caches.
pub struct BrittleCacheSession;

impl InferenceSession for BrittleCacheSession {
    fn infer(&mut self, buffer: &PixelBuffer) -> Result<RecognitionResult, InferenceError> {
        let value = buffer.samples().first().copied().unwrap_or(0);
        Ok(RecognitionResult::new(format!("page-{value}"), 88.0))
    }

    fn release_caches(&mut self) {
        panic!("cache arena corrupted");
    }
}

pub fn factory(
    tally: Arc<Tally>,
    delay: Duration,
) -> impl Fn(usize) -> Result<Box<dyn InferenceSession>, InferenceError> + Send + Sync + 'static {
    move |_worker: usize| -> Result<Box<dyn InferenceSession>, InferenceError> {
        tally.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            tally: Arc::clone(&tally),
            delay,
        }))
    }
}

/// Builds and initializes a pool without memory sampling.
pub fn start_pool(config: PoolConfig, workers: usize, delay: Duration) -> (WorkerPool, Arc<Tally>) {
    let tally = Arc::new(Tally::default());
    let pool = WorkerPool::builder(factory(Arc::clone(&tally), delay))
        .config(config)
        .without_memory_sampler()
        .build()
        .expect("valid config");
    pool.initialize(Some(workers)).expect("initialize");
    (pool, tally)
}

pub fn texts(outcomes: &[TaskOutcome]) -> Vec<Option<String>> {
    outcomes
        .iter()
        .map(|o| o.result.as_ref().map(|r| r.text.clone()))
        .collect()
}
