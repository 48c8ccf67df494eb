//! Stream context and the producer-facing control API.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::info;

use crate::binder::StreamBinder;
use crate::device::{self, SILENT_BLOCK_ADDR};
use crate::ring::RingBuffer;

/// Stream configuration, fixed at construction except for the sample rate.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Bit N set means hardware channel N participates in playback.
    pub channel_mask: u32,
    /// Per-channel byte stride within a chunk.
    pub interleave: usize,
    /// Initial playback sample rate in Hz; mutable later through
    /// [`Stream::set_sample_rate`].
    pub sample_rate: u32,
    /// Byte offset of the double buffer in device memory.
    pub device_base: u32,
    /// Ring-buffer capacity in bytes. Should be a multiple of the chunk
    /// size so chunks never straddle the wrap point.
    pub capacity: usize,
    /// Buffered-byte level at or below which the refill callback fires.
    pub refill_threshold: usize,
}

impl StreamConfig {
    /// Bytes consumed from the ring buffer per consumption interrupt.
    pub fn chunk_size(&self) -> usize {
        self.interleave * self.channel_mask.count_ones() as usize
    }
}

/// Callbacks delivered from interrupt context.
///
/// Implementations must not block or allocate: hand the event off to
/// mainline code (an atomic flag, a channel `try_send`) and return.
pub trait StreamEvents: Send + Sync {
    /// Buffered data dropped to or below the refill threshold. Fired once
    /// per dip: not again until the level rises above the threshold and
    /// dips once more.
    fn refill_needed(&self) {}

    /// A consumption cycle found less than one chunk buffered. Playback
    /// continues on stale data until the producer catches up.
    fn underrun(&self) {}
}

/// Point-in-time diagnostics snapshot of a stream.
#[derive(Clone, Copy, Debug)]
pub struct StreamStatus {
    /// Bytes currently buffered.
    pub buffered: usize,
    /// Ring-buffer capacity in bytes.
    pub capacity: usize,
    /// Bytes consumed per interrupt cycle.
    pub chunk_size: usize,
    /// Chunks consumed since construction.
    pub chunks: u64,
    /// Underrun cycles observed since construction.
    pub underruns: u64,
    /// Whether a chunk upload is currently in flight.
    pub buffering: bool,
    /// Whether this stream is bound to the hardware.
    pub active: bool,
}

/// State shared between the producer handle and the interrupt side.
pub(crate) struct Shared {
    pub(crate) ring: RingBuffer,
    pub(crate) config: StreamConfig,
    pub(crate) events: Option<Arc<dyn StreamEvents>>,
    pub(crate) chunk_size: usize,
    /// Live copy of the one mutable config field.
    pub(crate) sample_rate: AtomicU32,
    /// Which double-buffer half is the fill target.
    pub(crate) db_active: AtomicBool,
    /// Chunk upload in flight.
    pub(crate) buffering: AtomicBool,
    /// Refill callback already issued for the current dip.
    pub(crate) callback_issued: AtomicBool,
    pub(crate) chunk_counter: AtomicU64,
    pub(crate) underruns: AtomicU64,
    /// Staging buffer the chunk is copied into before upload, so a chunk
    /// that straddles the ring's wrap point still uploads as one block.
    pub(crate) scratch: Mutex<Vec<u8>>,
}

/// Producer and control handle for one audio stream.
///
/// The handle is the single producer: [`feed_ptr`](Stream::feed_ptr) and
/// [`feed`](Stream::feed) take `&mut self`, so the borrow checker enforces
/// the producer half of the ring's SPSC contract. The consumer half runs
/// through the [`StreamBinder`] whenever the device driver reports a
/// consumption interrupt.
///
/// Several streams may exist against one binder, but at most one is bound
/// to the hardware at a time. Dropping a bound stream stops it first.
pub struct Stream {
    shared: Arc<Shared>,
    binder: Arc<StreamBinder>,
}

impl Stream {
    /// Create a stream for `binder`'s hardware channel set.
    ///
    /// # Panics
    ///
    /// Panics if the channel mask selects no channels, the interleave is
    /// zero, or the ring capacity is zero. All three are unrecoverable
    /// misconfiguration, caught before any hardware state is touched.
    pub fn new(
        binder: &Arc<StreamBinder>,
        config: StreamConfig,
        events: Option<Arc<dyn StreamEvents>>,
    ) -> Self {
        assert!(config.channel_mask != 0, "channel mask selects no channels");
        assert!(config.interleave != 0, "interleave must be non-zero");

        let chunk_size = config.chunk_size();
        let shared = Arc::new(Shared {
            ring: RingBuffer::new(config.capacity),
            sample_rate: AtomicU32::new(config.sample_rate),
            events,
            chunk_size,
            db_active: AtomicBool::new(false),
            buffering: AtomicBool::new(false),
            callback_issued: AtomicBool::new(false),
            chunk_counter: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            scratch: Mutex::new(vec![0u8; chunk_size]),
            config,
        });
        Self {
            shared,
            binder: Arc::clone(binder),
        }
    }

    /// Bind this stream to the hardware and begin playback.
    ///
    /// Returns `false`, touching no state, if a stream is already bound.
    ///
    /// When `resume` is `false` the pipeline is primed synchronously: the
    /// consumption logic runs once and the call blocks until the resulting
    /// upload completes, so valid data sits in device memory before any
    /// channel is keyed on. Either way the consumption logic runs once more
    /// to stage the second half, then all configured channels are keyed on
    /// simultaneously.
    pub fn start(&mut self, resume: bool) -> bool {
        if !self.binder.bind(&self.shared) {
            return false;
        }
        let device = self.binder.device();
        let shared = &self.shared;

        if !resume {
            shared.consumption_cycle(device);
            device.wait_upload();
        }

        let mut address = shared.config.device_base
            + if shared.db_active.load(Ordering::Acquire) {
                shared.chunk_size as u32
            } else {
                0
            };
        let rate = shared.sample_rate.load(Ordering::Relaxed);

        device.set_playback(shared.config.channel_mask, false);
        for ch in device::active_channels(shared.config.channel_mask) {
            device.set_channel_start(ch, address);
            device.set_channel_rate(ch, rate);
            device.set_channel_envelope_on(ch);
            address += shared.config.interleave as u32;
        }

        shared.consumption_cycle(device);
        device.set_playback(shared.config.channel_mask, true);

        info!(
            channels = shared.config.channel_mask.count_ones(),
            rate, resume, "stream started"
        );
        true
    }

    /// Unbind from the hardware, parking the channels on the silent block.
    ///
    /// Returns `false` if this stream is not the one currently bound.
    pub fn stop(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        let device = self.binder.device();
        let mask = self.shared.config.channel_mask;

        // Channels keep reading device memory even when keyed off; park
        // them on the silent block so they can never cross the interrupt
        // trigger address again.
        device.set_playback(mask, false);
        for ch in device::active_channels(mask) {
            device.set_channel_start(ch, SILENT_BLOCK_ADDR);
        }
        device.set_playback(mask, true);

        self.binder.unbind();
        info!("stream stopped");
        true
    }

    /// Change the playback sample rate, reprogramming every active channel
    /// immediately if this stream is bound. Playback is not interrupted.
    pub fn set_sample_rate(&mut self, rate: u32) {
        self.shared.sample_rate.store(rate, Ordering::Relaxed);
        if self.is_active() {
            let device = self.binder.device();
            for ch in device::active_channels(self.shared.config.channel_mask) {
                device.set_channel_rate(ch, rate);
            }
        }
    }

    /// Whether this stream is the one currently bound to the hardware.
    pub fn is_active(&self) -> bool {
        self.binder.is_bound(&self.shared)
    }

    /// Free space in the ring buffer: how many bytes the producer could
    /// feed right now.
    pub fn refill_length(&self) -> usize {
        self.shared.ring.free()
    }

    /// Contiguous writable region of the ring buffer.
    ///
    /// May be shorter than [`refill_length`](Self::refill_length) when the
    /// free region wraps past the end of the buffer: write up to the
    /// returned length, [`feed`](Self::feed) it, then call again for the
    /// rest. Empty when the buffer is full.
    pub fn feed_ptr(&mut self) -> &mut [u8] {
        // SAFETY: `&mut self` makes this handle the sole producer, and the
        // returned borrow blocks further producer calls until released.
        unsafe { self.shared.ring.writable_region() }
    }

    /// Commit `n` bytes written through [`feed_ptr`](Self::feed_ptr),
    /// clamped to the available free space. Returns the number of bytes
    /// actually committed.
    pub fn feed(&mut self, n: usize) -> usize {
        let committed = self.shared.ring.commit(n);
        // Rising back above the threshold re-arms the refill callback for
        // the next dip.
        if self.shared.ring.len() > self.shared.config.refill_threshold {
            self.shared.callback_issued.store(false, Ordering::Release);
        }
        committed
    }

    /// Diagnostics snapshot.
    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            buffered: self.shared.ring.len(),
            capacity: self.shared.ring.capacity(),
            chunk_size: self.shared.chunk_size,
            chunks: self.shared.chunk_counter.load(Ordering::Relaxed),
            underruns: self.shared.underruns.load(Ordering::Relaxed),
            buffering: self.shared.buffering.load(Ordering::Acquire),
            active: self.is_active(),
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if self.is_active() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::StreamBinder;
    use crate::device::OutputDevice;

    struct NullDevice;

    impl OutputDevice for NullDevice {
        fn set_irq_enabled(&self, _enabled: bool) {}
        fn set_irq_address(&self, _addr: u32) {}
        fn set_loop_address(&self, _channel: u32, _addr: u32) {}
        fn set_channel_start(&self, _channel: u32, _addr: u32) {}
        fn set_channel_rate(&self, _channel: u32, _sample_rate: u32) {}
        fn set_channel_envelope_on(&self, _channel: u32) {}
        fn set_playback(&self, _mask: u32, _enabled: bool) {}
        fn begin_upload(&self, _addr: u32, _data: &[u8]) {}
        fn wait_upload(&self) {}
    }

    fn config() -> StreamConfig {
        StreamConfig {
            channel_mask: 0b11,
            interleave: 256,
            sample_rate: 44_100,
            device_base: 0x2000,
            capacity: 4_096,
            refill_threshold: 2_048,
        }
    }

    fn stream(config: StreamConfig) -> Stream {
        let binder = StreamBinder::new(Arc::new(NullDevice));
        Stream::new(&binder, config, None)
    }

    #[test]
    fn chunk_size_is_interleave_times_channels() {
        assert_eq!(config().chunk_size(), 512);

        let mut one = config();
        one.channel_mask = 0b1000;
        assert_eq!(one.chunk_size(), 256);
    }

    #[test]
    #[should_panic(expected = "no channels")]
    fn zero_channel_mask_panics() {
        let mut bad = config();
        bad.channel_mask = 0;
        let _ = stream(bad);
    }

    #[test]
    #[should_panic(expected = "interleave")]
    fn zero_interleave_panics() {
        let mut bad = config();
        bad.interleave = 0;
        let _ = stream(bad);
    }

    #[test]
    #[should_panic(expected = "capacity")]
    fn zero_capacity_panics() {
        let mut bad = config();
        bad.capacity = 0;
        let _ = stream(bad);
    }

    #[test]
    fn feed_accumulates_and_clamps() {
        let mut s = stream(config());
        assert_eq!(s.refill_length(), 4_096);

        let region = s.feed_ptr();
        assert_eq!(region.len(), 4_096);
        region[..3_000].fill(0xAB);
        assert_eq!(s.feed(3_000), 3_000);
        assert_eq!(s.status().buffered, 3_000);

        // More than the remaining space commits only what fits.
        assert_eq!(s.feed(5_000), 1_096);
        assert_eq!(s.status().buffered, 4_096);
        assert_eq!(s.refill_length(), 0);
        assert!(s.feed_ptr().is_empty());
        assert_eq!(s.feed(1), 0);
    }

    #[test]
    fn feed_above_threshold_rearms_refill_flag() {
        let s = stream(config());
        let shared = Arc::clone(&s.shared);
        let mut s = s;

        shared
            .callback_issued
            .store(true, std::sync::atomic::Ordering::Release);

        // Still at the threshold: flag stays latched.
        s.feed(2_048);
        assert!(shared.callback_issued.load(std::sync::atomic::Ordering::Acquire));

        // Strictly above: flag clears.
        s.feed(1);
        assert!(!shared.callback_issued.load(std::sync::atomic::Ordering::Acquire));
    }

    #[test]
    fn new_stream_is_inactive() {
        let s = stream(config());
        assert!(!s.is_active());
        let status = s.status();
        assert_eq!(status.chunks, 0);
        assert_eq!(status.underruns, 0);
        assert!(!status.buffering);
    }
}
