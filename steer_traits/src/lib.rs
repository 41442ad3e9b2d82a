pub mod clock;
pub mod registers;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use registers::{ObjectAddr, RegisterMap};

/// Error type crossing the hardware seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Emergency notification pushed asynchronously by the drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmcyMessage {
    pub code: u16,
    pub register: u8,
    pub data: [u8; 5],
}

pub type EmcyCallback = Box<dyn FnMut(EmcyMessage) + Send>;

/// Object-dictionary access to one drive node.
///
/// Values travel as little-endian byte strings; typing is the caller's job.
/// Calls are synchronous and may block; no timeout is imposed here.
pub trait ObjectChannel {
    fn read(&mut self, index: u16, subindex: u8) -> Result<Vec<u8>, BoxError>;

    fn write(&mut self, index: u16, subindex: u8, data: &[u8]) -> Result<(), BoxError>;

    /// Object addresses of the attached drive.
    fn register_map(&self) -> RegisterMap {
        RegisterMap::default()
    }

    /// Persist the current parameter set in the drive's non-volatile memory.
    fn store_parameters(&mut self) -> Result<(), BoxError> {
        let map = self.register_map();
        self.write(
            map.store_parameters.index,
            map.store_parameters.subindex,
            &registers::STORE_SIGNATURE.to_le_bytes(),
        )
    }

    /// Restore the drive's factory parameter set.
    fn restore_defaults(&mut self) -> Result<(), BoxError> {
        let map = self.register_map();
        self.write(
            map.restore_defaults.index,
            map.restore_defaults.subindex,
            &registers::RESTORE_SIGNATURE.to_le_bytes(),
        )
    }

    /// Register a listener for EMCY frames. Channels without EMCY support ignore it.
    fn on_emcy(&mut self, _callback: EmcyCallback) {}
}

impl<T: ObjectChannel + ?Sized> ObjectChannel for Box<T> {
    fn read(&mut self, index: u16, subindex: u8) -> Result<Vec<u8>, BoxError> {
        (**self).read(index, subindex)
    }

    fn write(&mut self, index: u16, subindex: u8, data: &[u8]) -> Result<(), BoxError> {
        (**self).write(index, subindex, data)
    }

    fn register_map(&self) -> RegisterMap {
        (**self).register_map()
    }

    fn store_parameters(&mut self) -> Result<(), BoxError> {
        (**self).store_parameters()
    }

    fn restore_defaults(&mut self) -> Result<(), BoxError> {
        (**self).restore_defaults()
    }

    fn on_emcy(&mut self, callback: EmcyCallback) {
        (**self).on_emcy(callback);
    }
}
