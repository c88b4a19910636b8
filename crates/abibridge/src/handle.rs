//! Foreign object handles
//!
//! A handle is what a foreign caller receives when it acquires an interface.
//! Its layout is fixed: the vtable pointer comes first (where the foreign
//! object model expects it) and the opaque native pointer second.
//!
//! ```text
//! ForeignHandle<V>
//! ┌──────────────┐       ┌──────────────┐
//! │ vtable       │──────▶│ thunk 0      │  shared by every handle
//! ├──────────────┤       │ thunk 1      │  of one interface version
//! │ native       │──┐    │ ...          │
//! └──────────────┘  │    └──────────────┘
//!                   └──▶ native-side object (not owned)
//! ```

use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::ffi::c_void;
use std::ptr::NonNull;

use crate::descriptor::InterfaceDescriptor;
use crate::vtable::descriptor_of;

/// The object a foreign caller holds: vtable pointer, then native pointer.
#[repr(C)]
pub struct ForeignHandle<V> {
    /// Shared foreign vtable (field 0)
    pub vtable: *const V,
    /// Paired native-side object (field 1), never owned
    pub native: *mut c_void,
}

impl<V> ForeignHandle<V> {
    /// Allocate a handle pairing `vtable` with `native`.
    ///
    /// Allocation failure aborts the process: without the handle the
    /// interface cannot be handed out at all.
    pub fn create(
        vtable: &'static V,
        native: *mut c_void,
        descriptor: &'static InterfaceDescriptor,
    ) -> NonNull<Self> {
        let layout = Layout::new::<Self>();
        // SAFETY: the layout is non-zero sized (two pointers)
        let raw = unsafe { alloc(layout) } as *mut Self;
        let Some(handle) = NonNull::new(raw) else {
            log::error!("out of memory allocating handle for {}", descriptor.version);
            handle_alloc_error(layout);
        };
        // SAFETY: freshly allocated with the layout of Self
        unsafe {
            handle.as_ptr().write(Self {
                vtable: vtable as *const V,
                native,
            });
        }
        log::trace!("{} -> {:p}", descriptor.version, handle.as_ptr());
        handle
    }

    /// Free a handle created by [`create`](Self::create). The native object is
    /// left alone.
    ///
    /// # Safety
    /// `handle` must come from `create` and must not be used afterwards.
    pub unsafe fn destroy(handle: NonNull<Self>) {
        log::trace!("release {:p}", handle.as_ptr());
        // SAFETY: caller guarantees the handle was allocated by `create`
        unsafe { dealloc(handle.as_ptr() as *mut u8, Layout::new::<Self>()) }
    }

    /// The paired native-side object.
    #[inline]
    pub fn native(&self) -> *mut c_void {
        self.native
    }

    /// The shared foreign vtable.
    #[inline]
    pub fn vtable(&self) -> *const V {
        self.vtable
    }

    /// Descriptor of the interface version this handle implements.
    ///
    /// # Safety
    /// The handle's vtable must have been built by the vtable registry.
    pub unsafe fn descriptor(&self) -> &'static InterfaceDescriptor {
        // SAFETY: forwarded to the caller
        unsafe { descriptor_of(self.vtable as *const c_void) }
    }
}
