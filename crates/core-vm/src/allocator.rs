//! Binary buddy allocator backing the contract heap.
//!
//! The address space is a power of two. Blocks are tracked in a complete
//! binary tree stored as an array: node `i` covers `total_size >> depth(i)`
//! units and holds the size of the largest free block inside its range, or
//! `0` once the node itself has been handed out. Descendants of an allocated
//! node keep stale values; they are only ever read for truthiness while
//! climbing back up from a leaf.

use crate::AllocationError;

fn left_child(index: usize) -> usize {
    index * 2 + 1
}

fn right_child(index: usize) -> usize {
    index * 2 + 2
}

fn parent(index: usize) -> usize {
    (index + 1) / 2 - 1
}

/// Builds a fully free tree for `total_size` units
fn free_tree(total_size: usize) -> Result<Vec<usize>, AllocationError> {
    let node_count = total_size
        .checked_mul(2)
        .map(|n| n - 1)
        .ok_or(AllocationError::InvalidCapacity(total_size))?;

    let mut nodes = Vec::with_capacity(node_count);
    let mut node_size = total_size * 2;
    for i in 0..node_count {
        if (i + 1).is_power_of_two() {
            node_size /= 2;
        }
        nodes.push(node_size);
    }
    Ok(nodes)
}

#[derive(Debug, Clone)]
pub struct BuddyAllocator {
    total_size: usize,
    nodes: Vec<usize>,
}

impl BuddyAllocator {
    /// Creates an allocator over `total_size` units, which must be a power of two
    pub fn new(total_size: usize) -> Result<Self, AllocationError> {
        if total_size < 1 || !total_size.is_power_of_two() {
            return Err(AllocationError::InvalidCapacity(total_size));
        }

        Ok(Self {
            total_size,
            nodes: free_tree(total_size)?,
        })
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Size of the largest block a single `alloc` can currently return
    pub fn largest_free_block(&self) -> usize {
        self.nodes[0]
    }

    /// Hands out a block of at least `size` units and returns its offset.
    ///
    /// Requests are rounded up to a power of two (zero counts as one). Fails
    /// when no single free block of the rounded size exists, regardless of
    /// how many units are free in total.
    pub fn alloc(&mut self, size: usize) -> Result<usize, AllocationError> {
        let size = size.max(1);
        let size = size
            .checked_next_power_of_two()
            .ok_or(AllocationError::InsufficientMemory {
                requested: size,
                largest_free: self.nodes[0],
            })?;

        if self.nodes[0] < size {
            return Err(AllocationError::InsufficientMemory {
                requested: size,
                largest_free: self.nodes[0],
            });
        }

        let mut index = 0;
        let mut node_size = self.total_size;
        while node_size != size {
            index = if self.nodes[left_child(index)] >= size {
                left_child(index)
            } else {
                right_child(index)
            };
            node_size /= 2;
        }

        self.nodes[index] = 0;
        let offset = (index + 1) * node_size - self.total_size;

        while index > 0 {
            index = parent(index);
            self.nodes[index] = self.nodes[left_child(index)].max(self.nodes[right_child(index)]);
        }

        Ok(offset)
    }

    /// Returns the block containing `offset` to the free pool, merging
    /// buddies that become fully free on the way up.
    pub fn free(&mut self, offset: usize) -> Result<(), AllocationError> {
        let (mut index, mut node_size) = self.find_block(offset)?;
        self.nodes[index] = node_size;

        while index > 0 {
            index = parent(index);
            node_size *= 2;

            let left = self.nodes[left_child(index)];
            let right = self.nodes[right_child(index)];
            self.nodes[index] = if left + right == node_size {
                node_size
            } else {
                left.max(right)
            };
        }

        Ok(())
    }

    /// Size of the allocated block containing `offset`
    pub fn size(&self, offset: usize) -> Result<usize, AllocationError> {
        self.find_block(offset).map(|(_, node_size)| node_size)
    }

    /// Extends the address space by `additional` units.
    ///
    /// The new total must be a power-of-two multiple of the current one.
    /// Existing blocks keep their offsets and state; the appended range is free.
    pub fn grow(&mut self, additional: usize) -> Result<(), AllocationError> {
        let invalid = AllocationError::InvalidGrow {
            additional,
            total: self.total_size,
        };

        let new_total = self.total_size.checked_add(additional).ok_or_else(|| invalid.clone())?;
        let factor = new_total / self.total_size;
        if new_total % self.total_size != 0 || !factor.is_power_of_two() {
            return Err(invalid);
        }
        if factor == 1 {
            return Ok(());
        }

        let shift = factor.trailing_zeros();
        let mut nodes = free_tree(new_total).map_err(|_| invalid)?;

        // Old depth d, position p lands at new depth d + shift, position p.
        let old_depth = self.total_size.trailing_zeros();
        for depth in 0..=old_depth {
            let width = 1usize << depth;
            for pos in 0..width {
                nodes[(width << shift) - 1 + pos] = self.nodes[width - 1 + pos];
            }
        }

        // Only the leftmost path above the old root mixes old and new ranges.
        let mut index = (1usize << shift) - 1;
        let mut node_size = self.total_size;
        while index > 0 {
            index = parent(index);
            node_size *= 2;

            let left = nodes[left_child(index)];
            let right = nodes[right_child(index)];
            nodes[index] = if left + right == node_size {
                node_size
            } else {
                left.max(right)
            };
        }

        self.total_size = new_total;
        self.nodes = nodes;
        Ok(())
    }

    /// Climbs from the leaf of `offset` to the allocated node covering it
    fn find_block(&self, offset: usize) -> Result<(usize, usize), AllocationError> {
        if offset >= self.total_size {
            return Err(AllocationError::InvalidOffset {
                offset,
                total: self.total_size,
            });
        }

        let mut index = offset + self.total_size - 1;
        let mut node_size = 1;
        while self.nodes[index] > 0 {
            if index == 0 {
                return Err(AllocationError::NotAllocated(offset));
            }
            index = parent(index);
            node_size *= 2;
        }

        Ok((index, node_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_rejects_non_power_of_two_capacity() {
        assert!(matches!(BuddyAllocator::new(0), Err(AllocationError::InvalidCapacity(0))));
        assert!(matches!(BuddyAllocator::new(100), Err(AllocationError::InvalidCapacity(100))));
        assert!(BuddyAllocator::new(1).is_ok());
        assert_eq!(BuddyAllocator::new(256).unwrap().largest_free_block(), 256);
    }

    #[test]
    fn test_small_allocations_round_up() {
        let mut buddy = BuddyAllocator::new(256).unwrap();

        let first = buddy.alloc(10).unwrap();
        assert_eq!(first, 0);
        assert_eq!(buddy.size(first).unwrap(), 16);

        let second = buddy.alloc(20).unwrap();
        assert_eq!(second, 32);
        assert_eq!(buddy.size(second).unwrap(), 32);
    }

    #[test]
    fn test_zero_size_counts_as_one() {
        let mut buddy = BuddyAllocator::new(8).unwrap();
        let offset = buddy.alloc(0).unwrap();
        assert_eq!(buddy.size(offset).unwrap(), 1);
    }

    #[test]
    fn test_whole_space_then_exhausted() {
        let mut buddy = BuddyAllocator::new(256).unwrap();
        assert_eq!(buddy.alloc(256).unwrap(), 0);
        assert_eq!(buddy.largest_free_block(), 0);

        let err = buddy.alloc(1).unwrap_err();
        assert!(matches!(err, AllocationError::InsufficientMemory { requested: 1, largest_free: 0 }));
    }

    #[test]
    fn test_largest_block_check_not_total_free() {
        let mut buddy = BuddyAllocator::new(64).unwrap();
        let a = buddy.alloc(16).unwrap();
        let _b = buddy.alloc(16).unwrap();
        let _c = buddy.alloc(16).unwrap();
        let _d = buddy.alloc(16).unwrap();
        buddy.free(a).unwrap();

        // 16 units free in one block, but no 32-unit block
        assert_eq!(buddy.largest_free_block(), 16);
        assert!(buddy.alloc(32).is_err());
        assert_eq!(buddy.alloc(16).unwrap(), a);
    }

    #[test]
    fn test_free_then_alloc_returns_same_offset() {
        let mut buddy = BuddyAllocator::new(64).unwrap();
        let offset = buddy.alloc(32).unwrap();
        buddy.free(offset).unwrap();
        assert_eq!(buddy.alloc(32).unwrap(), offset);
    }

    #[test]
    fn test_free_reuse_for_every_power_of_two() {
        let total = 128;
        let mut size = 1;
        while size < total {
            let mut buddy = BuddyAllocator::new(total).unwrap();
            let _keep = buddy.alloc(size).unwrap();
            let offset = buddy.alloc(size).unwrap();
            buddy.free(offset).unwrap();
            assert_eq!(buddy.alloc(size).unwrap(), offset, "size {}", size);
            size *= 2;
        }
    }

    #[test]
    fn test_free_coalesces_buddies() {
        let mut buddy = BuddyAllocator::new(64).unwrap();
        let a = buddy.alloc(32).unwrap();
        let b = buddy.alloc(32).unwrap();
        assert_eq!(buddy.largest_free_block(), 0);

        buddy.free(a).unwrap();
        assert_eq!(buddy.largest_free_block(), 32);
        buddy.free(b).unwrap();
        assert_eq!(buddy.largest_free_block(), 64);
        assert_eq!(buddy.alloc(64).unwrap(), 0);
    }

    #[test]
    fn test_free_rejects_out_of_range_offset() {
        let mut buddy = BuddyAllocator::new(32).unwrap();
        assert!(matches!(
            buddy.free(32),
            Err(AllocationError::InvalidOffset { offset: 32, total: 32 })
        ));
        assert!(buddy.size(1000).is_err());
    }

    #[test]
    fn test_free_of_unallocated_offset() {
        let mut buddy = BuddyAllocator::new(32).unwrap();
        assert!(matches!(buddy.free(4), Err(AllocationError::NotAllocated(4))));
        assert!(matches!(buddy.size(4), Err(AllocationError::NotAllocated(4))));
    }

    #[test]
    fn test_grow_requires_power_of_two_multiple() {
        let mut buddy = BuddyAllocator::new(64).unwrap();
        assert!(matches!(buddy.grow(64 * 2), Err(AllocationError::InvalidGrow { .. })));
        assert!(matches!(buddy.grow(10), Err(AllocationError::InvalidGrow { .. })));
        assert!(matches!(buddy.grow(65), Err(AllocationError::InvalidGrow { .. })));
        assert_eq!(buddy.total_size(), 64);

        buddy.grow(64).unwrap();
        assert_eq!(buddy.total_size(), 128);
        buddy.grow(128 * 3).unwrap();
        assert_eq!(buddy.total_size(), 512);
    }

    #[test]
    fn test_grow_preserves_allocations() {
        let mut buddy = BuddyAllocator::new(64).unwrap();
        let a = buddy.alloc(16).unwrap();
        let b = buddy.alloc(8).unwrap();
        let c = buddy.alloc(32).unwrap();

        buddy.grow(192).unwrap();
        assert_eq!(buddy.total_size(), 256);
        assert_eq!(buddy.size(a).unwrap(), 16);
        assert_eq!(buddy.size(b).unwrap(), 8);
        assert_eq!(buddy.size(c).unwrap(), 32);

        // The appended range is one free 128-unit block plus a free 64-unit block
        assert_eq!(buddy.largest_free_block(), 128);
        let big = buddy.alloc(128).unwrap();
        assert_eq!(big, 128);
        let mid = buddy.alloc(64).unwrap();
        assert_eq!(mid, 64);

        // Freeing the old blocks coalesces across the old boundary
        buddy.free(big).unwrap();
        buddy.free(mid).unwrap();
        buddy.free(a).unwrap();
        buddy.free(b).unwrap();
        buddy.free(c).unwrap();
        assert_eq!(buddy.largest_free_block(), 256);
    }

    #[test]
    fn test_grow_when_full() {
        let mut buddy = BuddyAllocator::new(32).unwrap();
        assert_eq!(buddy.alloc(32).unwrap(), 0);
        buddy.grow(32).unwrap();

        assert_eq!(buddy.largest_free_block(), 32);
        assert_eq!(buddy.alloc(32).unwrap(), 32);
        assert_eq!(buddy.size(0).unwrap(), 32);
    }

    #[test]
    fn test_random_sequence_never_overlaps() {
        let total = 1024;
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut buddy = BuddyAllocator::new(total).unwrap();
        let mut live: Vec<(usize, usize)> = Vec::new();

        for _ in 0..2_000 {
            if !live.is_empty() && rng.gen_bool(0.45) {
                let victim = rng.gen_range(0..live.len());
                let (offset, _) = live.swap_remove(victim);
                buddy.free(offset).unwrap();
                continue;
            }

            let request: usize = rng.gen_range(0..=96);
            let rounded = request.max(1).next_power_of_two();

            match buddy.alloc(request) {
                Ok(offset) => {
                    assert!(offset + rounded <= total);
                    assert_eq!(offset % rounded, 0);
                    for &(other, other_size) in &live {
                        let disjoint = offset + rounded <= other || other + other_size <= offset;
                        assert!(disjoint, "{}+{} overlaps {}+{}", offset, rounded, other, other_size);
                    }
                    live.push((offset, rounded));
                }
                Err(AllocationError::InsufficientMemory { .. }) => {
                    assert!(buddy.largest_free_block() < rounded);
                }
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
    }
}
