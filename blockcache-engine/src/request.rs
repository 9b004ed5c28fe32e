use serde::{Deserialize, Serialize};

/// Cache-miss candidate handed in by the cache engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Request {
    /// Backing (core) device the request targets
    pub core_id: u16,
    /// Byte address on the core device
    pub address: u64,
    /// Length in bytes
    pub length: u32,
    /// I/O class assigned by the classifier
    pub io_class: u8,
}

impl Request {
    pub fn new(core_id: u16, address: u64, length: u32, io_class: u8) -> Self {
        Self {
            core_id,
            address,
            length,
            io_class,
        }
    }
}
