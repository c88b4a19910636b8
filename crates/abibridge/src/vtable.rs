//! Foreign vtable registration
//!
//! Every (interface, version) gets exactly one vtable for the lifetime of the
//! process. The table is built from a prototype the generated code provides,
//! stored behind its descriptor and leaked, so that every handle of that
//! version points at the same address.
//!
//! ## Memory layout
//!
//! ```text
//! ┌────────────────────────┐
//! │ &InterfaceDescriptor   │  ← slot -1 (offset -8 on x64, -4 on x86)
//! ├────────────────────────┤
//! │ thunk 0                │  ← slot 0 (handle.vtable points here)
//! │ thunk 1                │
//! │ ...                    │
//! └────────────────────────┘
//! ```
//!
//! Slot -1 is where MSVC keeps its RTTI complete object locator. The bridge
//! stores the descriptor there instead, to recover it from a bare vtable
//! pointer.
//!
//! ## Limitations
//!
//! Handles carry no RTTI. A foreign caller that applies `typeid` or
//! `dynamic_cast` to a handle makes the runtime read a descriptor as a
//! complete object locator, which is undefined behavior. Handles only
//! support plain virtual calls.

use std::any::TypeId;
use std::collections::HashMap;
use std::ffi::c_void;
use std::mem::size_of;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::descriptor::{InterfaceDescriptor, InterfaceKey};
use crate::error::{BridgeError, Result};

/// A vtable with its descriptor stored at slot -1.
#[repr(C)]
pub struct RegisteredVtable<V> {
    /// Descriptor (slot -1 when viewed from `methods`)
    pub descriptor: &'static InterfaceDescriptor,
    /// The slots foreign callers dispatch through
    pub methods: V,
}

impl<V> RegisteredVtable<V> {
    pub const fn new(descriptor: &'static InterfaceDescriptor, methods: V) -> Self {
        Self {
            descriptor,
            methods,
        }
    }

    /// What a handle's vtable pointer should store.
    pub const fn vtable_ptr(&self) -> *const V {
        &self.methods
    }
}

/// Read the descriptor stored at slot -1.
///
/// # Safety
/// `vtable_ptr` must come from [`VtableRegistry::register`].
#[inline]
pub unsafe fn descriptor_of(vtable_ptr: *const c_void) -> &'static InterfaceDescriptor {
    // SAFETY: registered tables always carry the descriptor one slot before the methods
    unsafe {
        let slot = (vtable_ptr as *const &'static InterfaceDescriptor).offset(-1);
        *slot
    }
}

struct Entry {
    table: *const c_void,
    type_id: TypeId,
}

// SAFETY: `table` points to a leaked, immutable RegisteredVtable
unsafe impl Send for Entry {}

/// Process-wide set of built vtables, keyed by [`InterfaceKey`].
#[derive(Default)]
pub struct VtableRegistry {
    tables: Mutex<HashMap<InterfaceKey, Entry>>,
}

impl VtableRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the vtable for `descriptor` from `prototype`, or return the one
    /// built earlier for the same key.
    ///
    /// `V` must be a `#[repr(C)]` struct of exactly `descriptor.slot_count`
    /// function pointers.
    pub fn register<V: Sync + 'static>(
        &self,
        descriptor: &'static InterfaceDescriptor,
        prototype: V,
    ) -> Result<&'static V> {
        let key = descriptor.key();
        let mut tables = self.tables.lock();

        if let Some(entry) = tables.get(&key) {
            if entry.type_id != TypeId::of::<V>() {
                return Err(BridgeError::LayoutConflict { key });
            }
            // SAFETY: the type id check guarantees the entry was built from a `V`
            return Ok(unsafe { &*(entry.table as *const V) });
        }

        descriptor.validate()?;
        let actual = size_of::<V>() / size_of::<*const c_void>();
        if size_of::<V>() % size_of::<*const c_void>() != 0 || actual != descriptor.slot_count {
            return Err(BridgeError::SlotCountMismatch {
                key,
                expected: descriptor.slot_count,
                actual,
            });
        }

        let registered: &'static RegisteredVtable<V> =
            Box::leak(Box::new(RegisteredVtable::new(descriptor, prototype)));
        let table = registered.vtable_ptr();
        log::debug!(
            "built vtable for {} at {:p} ({} slots)",
            key,
            table,
            descriptor.slot_count
        );
        tables.insert(
            key,
            Entry {
                table: table as *const c_void,
                type_id: TypeId::of::<V>(),
            },
        );
        Ok(&registered.methods)
    }

    /// Address of the vtable built for `key`, if any.
    #[must_use]
    pub fn lookup(&self, key: &InterfaceKey) -> Option<*const c_void> {
        self.tables.lock().get(key).map(|entry| entry.table)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.lock().is_empty()
    }
}

static REGISTRY: Lazy<VtableRegistry> = Lazy::new(VtableRegistry::new);

/// The registry generated factories build their vtables in.
pub fn registry() -> &'static VtableRegistry {
    &REGISTRY
}
