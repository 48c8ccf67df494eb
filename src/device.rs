//! Output-device driver contract.
//!
//! The engine never touches hardware registers itself: everything it needs
//! from the DAC channel hardware is expressed through [`OutputDevice`], and
//! the caller supplies an implementation wrapping its register/DMA layer.
//! Addresses are byte offsets into the shared device-memory region, which
//! the driver (not this crate) allocates and lays out.

/// Device-memory byte offset of the silent block that
/// [`Stream::stop`](crate::Stream::stop) parks channels on.
///
/// Channels keep fetching from device memory even when keyed off, so a
/// stopped stream must leave them pointing at a block that loops silently
/// and never crosses the consumption-interrupt trigger address. The start
/// of device memory is reserved for capture state, and drivers are expected
/// to pre-load a looping silent sample at this offset.
pub const SILENT_BLOCK_ADDR: u32 = 0x1000;

/// Register-level primitives implemented by the output-device driver.
///
/// All methods may be called from interrupt context and must not block,
/// with the single exception of [`wait_upload`](Self::wait_upload), which
/// is only used by the synchronous priming step of
/// [`Stream::start`](crate::Stream::start).
pub trait OutputDevice: Send + Sync {
    /// Enable or disable the consumption interrupt. Disabling is also how a
    /// pending interrupt condition is acknowledged.
    fn set_irq_enabled(&self, enabled: bool);

    /// Program the device-memory address whose playback triggers the next
    /// consumption interrupt.
    fn set_irq_address(&self, addr: u32);

    /// Program one channel's loop/jump target: on reaching the end of its
    /// current block the channel continues at `addr` instead of looping.
    fn set_loop_address(&self, channel: u32, addr: u32);

    /// Program one channel's playback start address.
    fn set_channel_start(&self, channel: u32, addr: u32);

    /// Program one channel's playback rate from a sample rate in Hz. The
    /// driver owns the conversion to its pitch register encoding.
    fn set_channel_rate(&self, channel: u32, sample_rate: u32);

    /// Put one channel's envelope into an always-on state (full level, no
    /// decay), so it plays whatever its address points at indefinitely.
    fn set_channel_envelope_on(&self, channel: u32);

    /// Key playback on or off for every channel in `mask` simultaneously.
    fn set_playback(&self, mask: u32, enabled: bool);

    /// Start an asynchronous upload of `data` into device memory at `addr`.
    ///
    /// The driver must capture the bytes before returning; completion is
    /// reported by invoking
    /// [`StreamBinder::transfer_complete`](crate::StreamBinder::transfer_complete).
    fn begin_upload(&self, addr: u32, data: &[u8]);

    /// Block until the most recent [`begin_upload`](Self::begin_upload) has
    /// finished writing device memory.
    fn wait_upload(&self);
}

/// Iterate the channel numbers set in `mask`, lowest first.
pub fn active_channels(mask: u32) -> impl Iterator<Item = u32> {
    (0..u32::BITS).filter(move |ch| mask & (1 << ch) != 0)
}
