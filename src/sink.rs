//! Destinations for resolved streams and subtitles.
//!
//! Strategies may run concurrently, so everything they emit goes through an
//! [`Emitter`], which serializes calls into the caller's sinks.

use crate::model::{StreamDescriptor, SubtitleTrack};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc::UnboundedSender;

/// Receives stream descriptors as soon as they are resolved.
pub trait StreamSink: Send + Sync {
    fn emit(&self, stream: StreamDescriptor);
}

/// Receives subtitle tracks discovered while resolving.
pub trait SubtitleSink: Send + Sync {
    fn emit(&self, subtitle: SubtitleTrack);
}

impl<F> StreamSink for F
where
    F: Fn(StreamDescriptor) + Send + Sync,
{
    fn emit(&self, stream: StreamDescriptor) {
        self(stream)
    }
}

impl<F> SubtitleSink for F
where
    F: Fn(SubtitleTrack) + Send + Sync,
{
    fn emit(&self, subtitle: SubtitleTrack) {
        self(subtitle)
    }
}

/// Sink that forwards into an unbounded tokio channel.
///
/// Sends after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink<T>(pub UnboundedSender<T>);

impl StreamSink for ChannelSink<StreamDescriptor> {
    fn emit(&self, stream: StreamDescriptor) {
        let _ = self.0.send(stream);
    }
}

impl SubtitleSink for ChannelSink<SubtitleTrack> {
    fn emit(&self, subtitle: SubtitleTrack) {
        let _ = self.0.send(subtitle);
    }
}

/// Sink that keeps everything it receives.
#[derive(Debug)]
pub struct CollectingSink<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Default for CollectingSink<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> CollectingSink<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the collected items in arrival order.
    pub fn items(&self) -> Vec<T> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl StreamSink for CollectingSink<StreamDescriptor> {
    fn emit(&self, stream: StreamDescriptor) {
        self.items.lock().push(stream);
    }
}

impl SubtitleSink for CollectingSink<SubtitleTrack> {
    fn emit(&self, subtitle: SubtitleTrack) {
        self.items.lock().push(subtitle);
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StreamSink for NullSink {
    fn emit(&self, _stream: StreamDescriptor) {}
}

impl SubtitleSink for NullSink {
    fn emit(&self, _subtitle: SubtitleTrack) {}
}

/// Serializing, counting front for one resolution run's sinks.
pub(crate) struct Emitter<'a> {
    streams: &'a dyn StreamSink,
    subtitles: &'a dyn SubtitleSink,
    lock: Mutex<()>,
    emitted: AtomicUsize,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(subtitles: &'a dyn SubtitleSink, streams: &'a dyn StreamSink) -> Self {
        Self {
            streams,
            subtitles,
            lock: Mutex::new(()),
            emitted: AtomicUsize::new(0),
        }
    }

    /// Number of stream descriptors forwarded so far.
    pub(crate) fn emitted(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }
}

impl StreamSink for Emitter<'_> {
    fn emit(&self, stream: StreamDescriptor) {
        let _guard = self.lock.lock();
        self.streams.emit(stream);
        self.emitted.fetch_add(1, Ordering::SeqCst);
    }
}

impl SubtitleSink for Emitter<'_> {
    fn emit(&self, subtitle: SubtitleTrack) {
        let _guard = self.lock.lock();
        self.subtitles.emit(subtitle);
    }
}

/// Forwards to another sink while keeping a copy of each stream.
pub(crate) struct TeeSink<'a> {
    inner: &'a dyn StreamSink,
    seen: Mutex<Vec<StreamDescriptor>>,
}

impl<'a> TeeSink<'a> {
    pub(crate) fn new(inner: &'a dyn StreamSink) -> Self {
        Self {
            inner,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn into_seen(self) -> Vec<StreamDescriptor> {
        self.seen.into_inner()
    }
}

impl StreamSink for TeeSink<'_> {
    fn emit(&self, stream: StreamDescriptor) {
        self.seen.lock().push(stream.clone());
        self.inner.emit(stream);
    }
}
