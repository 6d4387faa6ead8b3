//! Size limits for zones and encoded values
//!
//! All addresses inside a segment are 32-bit heap offsets, which bounds both
//! the zone size and every single allocation.

/// Deepest table nesting the codec will encode
///
/// A table at the top level has depth 1; each table stored inside it adds one.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Smallest zone size accepted by configuration (32 KiB)
pub const MIN_ZONE_SIZE: usize = 32 * 1024;

/// Largest zone size accepted by configuration
///
/// Heap offsets are `u32`, so the heap must stay addressable by them.
pub const MAX_ZONE_SIZE: usize = u32::MAX as usize;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_size_bounds_are_ordered() {
        assert!(MIN_ZONE_SIZE < MAX_ZONE_SIZE);
        assert!(MAX_NESTING_DEPTH > 1);
    }
}
