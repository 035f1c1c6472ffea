//! Native buffer admission and accounting
//!
//! Every native buffer the bridge creates is admitted by a
//! [`NativeAllocator`] before memory is reserved and reported back when it
//! is freed. The default [`TrackingAllocator`] keeps live counters, which is
//! how leaks on failure paths are observed, and can enforce a byte limit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cuglue_sdk::{BridgeError, BridgeResult};

/// Admission policy for native buffers
pub trait NativeAllocator: Send + Sync {
    /// Admit a buffer of `bytes`. Returning `false` makes the allocation
    /// fail with `BridgeError::Allocation`.
    fn reserve(&self, bytes: usize) -> bool;

    /// A buffer admitted by `reserve` was freed
    fn release(&self, bytes: usize);
}

/// Counts live native buffers and bytes, optionally capping live bytes
#[derive(Debug, Default)]
pub struct TrackingAllocator {
    live_buffers: AtomicUsize,
    live_bytes: AtomicUsize,
    limit: Option<usize>,
}

impl TrackingAllocator {
    /// Unlimited allocator
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator refusing buffers once `limit` live bytes would be exceeded
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Buffers admitted and not yet released
    pub fn live_buffers(&self) -> usize {
        self.live_buffers.load(Ordering::Acquire)
    }

    /// Bytes admitted and not yet released
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Acquire)
    }
}

impl NativeAllocator for TrackingAllocator {
    fn reserve(&self, bytes: usize) -> bool {
        if let Some(limit) = self.limit {
            let admitted = self
                .live_bytes
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                    live.checked_add(bytes).filter(|total| *total <= limit)
                })
                .is_ok();
            if !admitted {
                return false;
            }
        } else {
            self.live_bytes.fetch_add(bytes, Ordering::AcqRel);
        }
        self.live_buffers.fetch_add(1, Ordering::AcqRel);
        true
    }

    fn release(&self, bytes: usize) {
        self.live_bytes.fetch_sub(bytes, Ordering::AcqRel);
        self.live_buffers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Admission ticket for one buffer; reports the release on drop
pub(crate) struct Allocation {
    allocator: Arc<dyn NativeAllocator>,
    bytes: usize,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.allocator.release(self.bytes);
    }
}

/// Allocate `len` copies of `value` through `allocator`
pub(crate) fn allocate<T: Clone>(
    allocator: &Arc<dyn NativeAllocator>,
    len: usize,
    value: T,
) -> BridgeResult<(Vec<T>, Allocation)> {
    let bytes = len.saturating_mul(std::mem::size_of::<T>());
    if !allocator.reserve(bytes) {
        return Err(BridgeError::Allocation { bytes });
    }
    let ticket = Allocation {
        allocator: Arc::clone(allocator),
        bytes,
    };
    let mut buf = Vec::new();
    // `ticket` drops with the error, undoing the reservation
    buf.try_reserve_exact(len)
        .map_err(|_| BridgeError::Allocation { bytes })?;
    buf.resize(len, value);
    Ok((buf, ticket))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_counts() {
        let tracker = Arc::new(TrackingAllocator::new());
        let allocator: Arc<dyn NativeAllocator> = tracker.clone();
        let (buf, ticket) = allocate::<i32>(&allocator, 4, 0).unwrap();
        assert_eq!(buf, vec![0; 4]);
        assert_eq!(tracker.live_buffers(), 1);
        assert_eq!(tracker.live_bytes(), 16);
        drop(ticket);
        assert_eq!(tracker.live_buffers(), 0);
        assert_eq!(tracker.live_bytes(), 0);
    }

    #[test]
    fn test_limit_refuses_allocation() {
        let tracker = Arc::new(TrackingAllocator::with_limit(10));
        let allocator: Arc<dyn NativeAllocator> = tracker.clone();
        let first = allocate::<u8>(&allocator, 8, 0).unwrap();
        let err = allocate::<u8>(&allocator, 8, 0).err();
        assert_eq!(err, Some(BridgeError::Allocation { bytes: 8 }));
        assert_eq!(tracker.live_buffers(), 1);
        drop(first);
        assert!(allocate::<u8>(&allocator, 8, 0).is_ok());
    }

    #[test]
    fn test_zero_length_allocation() {
        let allocator: Arc<dyn NativeAllocator> = Arc::new(TrackingAllocator::new());
        let (buf, _ticket) = allocate::<f64>(&allocator, 0, 0.0).unwrap();
        assert!(buf.is_empty());
    }
}
