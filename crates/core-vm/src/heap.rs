//! Guest heap adapter owning a single buddy allocator.

use crate::allocator::BuddyAllocator;
use crate::AllocationError;

/// Heap handed to one VM frame. Starts empty and becomes usable after `init`.
#[derive(Debug, Default)]
pub struct HeapMemory {
    allocator: Option<BuddyAllocator>,
}

impl HeapMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the allocator for `total_size` bytes, replacing any previous one
    pub fn init(&mut self, total_size: usize) -> Result<(), AllocationError> {
        self.allocator = Some(BuddyAllocator::new(total_size)?);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.allocator.is_some()
    }

    pub fn malloc(&mut self, size: usize) -> Result<usize, AllocationError> {
        self.allocator_mut()?.alloc(size)
    }

    pub fn free(&mut self, offset: usize) -> Result<(), AllocationError> {
        self.allocator_mut()?.free(offset)
    }

    pub fn grow_memory(&mut self, additional: usize) -> Result<(), AllocationError> {
        self.allocator_mut()?.grow(additional)
    }

    pub fn capacity(&self) -> Result<usize, AllocationError> {
        Ok(self.allocator()?.total_size())
    }

    pub fn size_of(&self, offset: usize) -> Result<usize, AllocationError> {
        self.allocator()?.size(offset)
    }

    fn allocator(&self) -> Result<&BuddyAllocator, AllocationError> {
        self.allocator.as_ref().ok_or(AllocationError::AllocatorNotInitialized)
    }

    fn allocator_mut(&mut self) -> Result<&mut BuddyAllocator, AllocationError> {
        self.allocator.as_mut().ok_or(AllocationError::AllocatorNotInitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized_heap_rejects_everything() {
        let mut heap = HeapMemory::new();
        assert!(!heap.is_initialized());
        assert_eq!(heap.malloc(8), Err(AllocationError::AllocatorNotInitialized));
        assert_eq!(heap.free(0), Err(AllocationError::AllocatorNotInitialized));
        assert_eq!(heap.grow_memory(8), Err(AllocationError::AllocatorNotInitialized));
        assert_eq!(heap.capacity(), Err(AllocationError::AllocatorNotInitialized));
    }

    #[test]
    fn test_init_rejects_bad_capacity() {
        let mut heap = HeapMemory::new();
        assert_eq!(heap.init(1000), Err(AllocationError::InvalidCapacity(1000)));
        assert!(!heap.is_initialized());
    }

    #[test]
    fn test_delegates_to_allocator() {
        let mut heap = HeapMemory::new();
        heap.init(1024).unwrap();

        let a = heap.malloc(100).unwrap();
        assert_eq!(heap.size_of(a).unwrap(), 128);

        heap.grow_memory(1024).unwrap();
        assert_eq!(heap.capacity().unwrap(), 2048);
        assert_eq!(heap.size_of(a).unwrap(), 128);

        heap.free(a).unwrap();
        assert!(heap.size_of(a).is_err());
    }
}
