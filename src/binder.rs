//! Hardware binding and interrupt dispatch.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::OutputDevice;
use crate::stream::Shared;

/// Explicit owner of one hardware channel set.
///
/// At most one [`Stream`](crate::Stream) is bound at a time, and
/// [`Stream::start`](crate::Stream::start) /
/// [`Stream::stop`](crate::Stream::stop) are the only mutators of the
/// binding. The device driver calls
/// [`consumption_irq`](Self::consumption_irq) and
/// [`transfer_complete`](Self::transfer_complete) in place of raw interrupt
/// vectors; both are no-ops while nothing is bound.
///
/// Binders are ordinary values: tests may create several, each wrapping its
/// own device, without interfering with one another.
pub struct StreamBinder {
    device: Arc<dyn OutputDevice>,
    active: Mutex<Option<Arc<Shared>>>,
}

impl StreamBinder {
    /// Create a binder owning `device`'s channel set.
    pub fn new(device: Arc<dyn OutputDevice>) -> Arc<Self> {
        Arc::new(Self {
            device,
            active: Mutex::new(None),
        })
    }

    /// Consumption-interrupt entry point: the hardware started playing the
    /// half whose address was programmed as the trigger.
    pub fn consumption_irq(&self) {
        let active = self.active.lock().clone();
        if let Some(shared) = active {
            shared.consumption_cycle(&*self.device);
        }
    }

    /// Transfer-completion entry point: the last chunk upload has fully
    /// reached device memory.
    pub fn transfer_complete(&self) {
        let active = self.active.lock().clone();
        if let Some(shared) = active {
            shared.upload_complete(&*self.device);
        }
    }

    pub(crate) fn device(&self) -> &dyn OutputDevice {
        &*self.device
    }

    /// Claim the binding for `shared`. Fails if any stream already holds it.
    pub(crate) fn bind(&self, shared: &Arc<Shared>) -> bool {
        let mut active = self.active.lock();
        if active.is_some() {
            return false;
        }
        *active = Some(Arc::clone(shared));
        true
    }

    pub(crate) fn is_bound(&self, shared: &Arc<Shared>) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|active| Arc::ptr_eq(active, shared))
    }

    pub(crate) fn unbind(&self) {
        *self.active.lock() = None;
    }
}
