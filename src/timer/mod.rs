//! The cancellable timer registry and the address-key helper synchronization primitives build
//! their waits on top of.

pub mod registry;

pub use registry::{Family, CANCELABLE_MAP_SIZE};

/// Derives a 64-bit address key from a pointer plus a small role offset.
///
/// Each primitive that needs more than one independent waiter queue (reader vs. writer, producer
/// vs. consumer, ...) reserves disjoint small offsets from its own address so each role lands in
/// a distinct key without any extra allocation -- the same trick `cancelable_timer.cpp` plays with
/// `get_hash_from_uaddr`, just without needing a separate hash step since the shard selector
/// already mixes the bits (see `registry::shard_index`).
pub(crate) fn addr_key<T>(ptr: *const T, role: usize) -> u64 {
    (ptr as usize).wrapping_add(role) as u64
}
