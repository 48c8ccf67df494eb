#![deny(missing_docs)]

//! Continuous audio output engine for a fixed-rate DAC playback channel.
//!
//! A producer that cannot guarantee real-time delivery (a disk reader, a
//! network fetcher, a decoder) feeds bytes into the ring buffer owned by a
//! [`Stream`]. The output hardware consumes them in fixed-size chunks
//! through a device-memory double buffer: each time one half starts
//! playing, the device raises a consumption interrupt, the feed scheduler
//! pulls the next chunk out of the ring, retargets the channels' loop/jump
//! addresses into the half that just went idle and starts an asynchronous
//! upload into it. A second interrupt reports upload completion and re-arms
//! the consumption interrupt, so a chunk can never be consumed before it
//! has fully reached device memory.
//!
//! Hardware access goes through the [`OutputDevice`] trait supplied by the
//! caller; a [`StreamBinder`] owns the device handle and routes the two
//! interrupt sources to whichever stream is currently bound. The producer
//! interacts only with [`Stream::refill_length`], [`Stream::feed_ptr`] /
//! [`Stream::feed`] and the [`StreamEvents`] callbacks (refill needed,
//! underrun), both of which are delivered from interrupt context and must
//! not block.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stream_kit::{Stream, StreamBinder, StreamConfig};
//! # struct Driver;
//! # impl stream_kit::OutputDevice for Driver {
//! #     fn set_irq_enabled(&self, _: bool) {}
//! #     fn set_irq_address(&self, _: u32) {}
//! #     fn set_loop_address(&self, _: u32, _: u32) {}
//! #     fn set_channel_start(&self, _: u32, _: u32) {}
//! #     fn set_channel_rate(&self, _: u32, _: u32) {}
//! #     fn set_channel_envelope_on(&self, _: u32) {}
//! #     fn set_playback(&self, _: u32, _: bool) {}
//! #     fn begin_upload(&self, _: u32, _: &[u8]) {}
//! #     fn wait_upload(&self) {}
//! # }
//!
//! let binder = StreamBinder::new(Arc::new(Driver));
//! let mut stream = Stream::new(
//!     &binder,
//!     StreamConfig {
//!         channel_mask: 0b11,
//!         interleave: 0x200,
//!         sample_rate: 44_100,
//!         device_base: 0x2000,
//!         capacity: 0x8000,
//!         refill_threshold: 0x4000,
//!     },
//!     None,
//! );
//!
//! // Pre-buffer, then start; keep feeding as space opens up.
//! while stream.refill_length() > 0 {
//!     let region = stream.feed_ptr();
//!     let n = region.len(); // fill `region` from the data source
//!     stream.feed(n);
//! }
//! assert!(stream.start(false));
//! ```

pub mod binder;
pub mod device;
mod feeder;
pub mod ring;
pub mod stream;

pub use binder::StreamBinder;
pub use device::{OutputDevice, SILENT_BLOCK_ADDR};
pub use ring::RingBuffer;
pub use stream::{Stream, StreamConfig, StreamEvents, StreamStatus};
