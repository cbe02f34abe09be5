//! Guest linear-memory access and heap placement.
//!
//! The heap occupies `[heap_base, heap_base + capacity)` at the end of the
//! contract's linear memory. Guest address 0 is never part of the heap, so a
//! heap pointer can't be mistaken for NULL. Strings cross the boundary as
//! NUL-terminated byte runs.

use tracing::{debug, error};
use wasmtime::{AsContext, AsContextMut, Caller, Extern, Memory, StoreContextMut};

use crate::config::WASM_PAGE_SIZE;
use crate::context::VmState;
use crate::import_resolver::MEMORY_IMPORT;
use crate::{AllocationError, InvocationError};

/// Memory the heap is bound to
pub fn guest_memory(ctx: impl AsContext<Data = VmState>) -> Option<Memory> {
    ctx.as_context().data().memory
}

/// Appends `heap_initial_size` bytes to `memory` and places the heap there.
///
/// An empty memory first gets one page of its own so the heap starts above 0.
pub fn bind_heap(
    mut ctx: impl AsContextMut<Data = VmState>,
    memory: Memory,
) -> Result<(), AllocationError> {
    let mut store = ctx.as_context_mut();
    let initial = store.data().ctx.config.heap_initial_size;

    if memory.data_size(&store) == 0 {
        memory
            .grow(&mut store, 1)
            .map_err(|e| AllocationError::LinearMemory(format!("cannot reserve page 0: {}", e)))?;
    }
    let base = memory.data_size(&store);

    memory
        .grow(&mut store, (initial / WASM_PAGE_SIZE) as u64)
        .map_err(|e| AllocationError::LinearMemory(format!("cannot reserve heap: {}", e)))?;

    let state = store.data_mut();
    state.heap.init(initial)?;
    state.heap_base = base;
    state.memory = Some(memory);

    debug!(heap_base = base, heap_size = initial, "Guest heap bound");
    Ok(())
}

/// Binds the heap to the module's exported `memory` if nothing is bound yet.
///
/// Host calls made by a start function run before instantiation returns, so
/// this is where a module defining its own memory gets its heap in that case.
pub fn attach_exported_memory(caller: &mut Caller<'_, VmState>) {
    if caller.data().memory.is_some() {
        return;
    }
    if let Some(Extern::Memory(memory)) = caller.get_export(MEMORY_IMPORT) {
        if let Err(e) = bind_heap(&mut *caller, memory) {
            error!(error = %e, "Can't bind guest heap");
        }
    }
}

/// Allocates `size` bytes on the guest heap and returns the guest address.
///
/// The heap doubles while the request does not fit, up to `heap_max_size`.
pub fn alloc_guest(
    mut ctx: impl AsContextMut<Data = VmState>,
    size: usize,
) -> Result<usize, AllocationError> {
    let mut store = ctx.as_context_mut();
    loop {
        let state = store.data_mut();
        match state.heap.malloc(size) {
            Ok(offset) => return Ok(state.heap_base + offset),
            Err(AllocationError::InsufficientMemory {
                requested,
                largest_free,
            }) => {
                if !grow_heap(&mut store)? {
                    return Err(AllocationError::InsufficientMemory {
                        requested,
                        largest_free,
                    });
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Doubles the heap; `false` once `heap_max_size` has been reached
fn grow_heap(store: &mut StoreContextMut<'_, VmState>) -> Result<bool, AllocationError> {
    let memory = store.data().memory.ok_or(AllocationError::AllocatorNotInitialized)?;
    let capacity = store.data().heap.capacity()?;
    let max = store.data().ctx.config.heap_max_size;

    if capacity.saturating_mul(2) > max {
        return Ok(false);
    }
    if store.data().heap_base + capacity != memory.data_size(&*store) {
        return Err(AllocationError::HeapNotContiguous);
    }

    memory
        .grow(&mut *store, (capacity / WASM_PAGE_SIZE) as u64)
        .map_err(|e| AllocationError::LinearMemory(format!("cannot grow heap: {}", e)))?;
    store.data_mut().heap.grow_memory(capacity)?;

    debug!(heap_size = capacity * 2, "Guest heap grown");
    Ok(true)
}

/// Releases the heap block at guest address `ptr`
pub fn free_guest(
    mut ctx: impl AsContextMut<Data = VmState>,
    ptr: i32,
) -> Result<(), AllocationError> {
    let mut store = ctx.as_context_mut();
    let state = store.data_mut();
    let addr = ptr as u32 as usize;
    let total = state.heap.capacity()?;
    let offset = addr
        .checked_sub(state.heap_base)
        .ok_or(AllocationError::InvalidOffset { offset: addr, total })?;
    state.heap.free(offset)
}

/// Copies `bytes` plus a NUL terminator onto the guest heap
pub fn write_bytes(
    mut ctx: impl AsContextMut<Data = VmState>,
    bytes: &[u8],
) -> Result<i32, AllocationError> {
    let mut store = ctx.as_context_mut();
    let addr = alloc_guest(&mut store, bytes.len() + 1)?;
    let memory = store.data().memory.ok_or(AllocationError::AllocatorNotInitialized)?;

    memory
        .write(&mut store, addr, bytes)
        .and_then(|_| memory.write(&mut store, addr + bytes.len(), &[0]))
        .map_err(|e| AllocationError::LinearMemory(e.to_string()))?;

    Ok(addr as u32 as i32)
}

/// Reads the NUL-terminated UTF-8 string at guest address `ptr`
pub fn read_string(ctx: impl AsContext<Data = VmState>, ptr: i32) -> Result<String, InvocationError> {
    let store = ctx.as_context();
    let memory = store
        .data()
        .memory
        .ok_or_else(|| InvocationError::GuestMemory("no linear memory bound".to_string()))?;
    let max_len = store.data().ctx.config.max_string_len;

    let data = memory.data(&store);
    let start = ptr as u32 as usize;
    if start >= data.len() {
        return Err(InvocationError::GuestMemory(format!(
            "pointer {} outside linear memory of {} bytes",
            start,
            data.len()
        )));
    }

    let window = &data[start..data.len().min(start.saturating_add(max_len.saturating_add(1)))];
    let len = window.iter().position(|&b| b == 0).ok_or_else(|| {
        if window.len() > max_len {
            InvocationError::GuestMemory(format!("string at {} longer than {} bytes", start, max_len))
        } else {
            InvocationError::GuestMemory(format!("unterminated string at {}", start))
        }
    })?;

    String::from_utf8(window[..len].to_vec())
        .map_err(|e| InvocationError::GuestMemory(format!("invalid UTF-8 string at {}: {}", start, e)))
}
