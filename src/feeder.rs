//! Double-buffer feed scheduler.
//!
//! The hardware raises one consumption interrupt each time it starts
//! playing a double-buffer half. The handler pulls the next chunk out of
//! the ring buffer, retargets the interrupt trigger and every channel's
//! loop/jump address into the half that just went idle, and starts the
//! asynchronous upload into it. A second interrupt reports upload
//! completion and re-arms the consumption interrupt, so it can never fire
//! again before the in-flight chunk has actually reached device memory.

use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use crate::device::{self, OutputDevice};
use crate::stream::Shared;

impl Shared {
    /// One consumption cycle: invoked by the binder on each consumption
    /// interrupt, and directly by [`Stream::start`](crate::Stream::start)
    /// while priming.
    pub(crate) fn consumption_cycle(&self, device: &dyn OutputDevice) {
        // Acknowledge first, before anything else: disabling the interrupt
        // is the only way to clear the pending condition. It is re-enabled
        // once the new chunk has been uploaded.
        device.set_irq_enabled(false);

        let buffered = self.ring.len();
        if buffered < self.chunk_size {
            self.underruns.fetch_add(1, Ordering::Relaxed);
            warn!(buffered, chunk_size = self.chunk_size, "underrun");
            if let Some(events) = &self.events {
                events.underrun();
            }
            // Keep the interrupt armed so the channels replay stale data
            // instead of stalling with the interrupt permanently disabled.
            device.set_irq_enabled(true);
            return;
        }

        let fill_upper = !self.db_active.fetch_xor(true, Ordering::AcqRel);
        self.buffering.store(true, Ordering::Release);
        let chunk = self.chunk_counter.fetch_add(1, Ordering::Relaxed) + 1;

        let mut scratch = self.scratch.lock();
        let pulled = self.ring.pop_into(&mut scratch[..]);
        debug_assert_eq!(pulled, self.chunk_size);

        let remaining = self.ring.len();
        if remaining <= self.config.refill_threshold
            && !self.callback_issued.swap(true, Ordering::AcqRel)
        {
            if let Some(events) = &self.events {
                events.refill_needed();
            }
        }

        let address = self.config.device_base
            + if fill_upper { self.chunk_size as u32 } else { 0 };

        // Trigger the next interrupt when the half being filled now starts
        // playing, and make every channel jump into it instead of looping
        // at the end of the half it is playing.
        device.set_irq_address(address);
        let mut offset = 0u32;
        for ch in device::active_channels(self.config.channel_mask) {
            device.set_loop_address(ch, address + offset);
            offset += self.config.interleave as u32;
        }

        debug!(chunk, remaining, address, "chunk dispatched");
        device.begin_upload(address, &scratch[..]);
    }

    /// Upload-completion interrupt: the chunk is in device memory, so the
    /// consumption interrupt may fire again.
    pub(crate) fn upload_complete(&self, device: &dyn OutputDevice) {
        device.set_irq_enabled(true);
        self.buffering.store(false, Ordering::Release);
    }
}
