//! A minimal BSON-style ObjectId: 4 bytes of seconds-since-epoch, a 5-byte
//! random identifier fixed for the process lifetime (standing in for the
//! canonical machine+process fields), and a 3-byte counter seeded randomly
//! at process start and incremented atomically on every call. This matches
//! the layout `wire_size` (see `value.rs`) assumes: 12 bytes, no padding.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub [u8; 12]);

impl ObjectId {
    /// Generates a fresh, globally-unique (within this process) ObjectId.
    pub fn generate() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0) as u32;

        let machine = process_identifier();
        let counter = next_counter();

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&machine);
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        ObjectId(bytes)
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId(\"{}\")", self.to_hex())
    }
}

fn process_identifier() -> [u8; 5] {
    static MACHINE_ID: OnceLock<[u8; 5]> = OnceLock::new();
    *MACHINE_ID.get_or_init(|| {
        let mut id = [0u8; 5];
        rand::rngs::OsRng.fill_bytes(&mut id);
        id
    })
}

fn next_counter() -> u32 {
    static COUNTER: OnceLock<AtomicU32> = OnceLock::new();
    let counter = COUNTER.get_or_init(|| {
        let mut seed = [0u8; 4];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        AtomicU32::new(u32::from_be_bytes(seed) & 0x00ff_ffff)
    });
    counter.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_distinct_ids() {
        let a = ObjectId::generate();
        let b = ObjectId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn hex_is_24_chars() {
        let id = ObjectId::generate();
        assert_eq!(id.to_hex().len(), 24);
    }
}
