//! Runtime support for generated thunks
//!
//! A thunk generated by `#[foreign_interface]` does four things: pull the
//! native pointer out of the handle, convert each argument, call through the
//! native object's vtable, convert the result back. The helpers here cover
//! the pointer plumbing, converted pointees, returned interfaces and the two
//! return channels so the generated bodies stay short.
//!
//! Native-side objects are vtable-first, like the foreign handle:
//!
//! ```text
//! native ──▶ ┌───────────────┐      ┌──────────────┐
//!            │ native vtable │─────▶│ fn 0 (C ABI) │
//!            ├───────────────┤      │ fn 1         │
//!            │ ...state...   │      │ ...          │
//!            └───────────────┘      └──────────────┘
//! ```

use std::ffi::{CStr, c_char, c_void};
use std::fmt::Display;
use std::ptr;

use crate::descriptor::InterfaceDescriptor;
use crate::factory::ConstructorTable;
use crate::handle::ForeignHandle;
use crate::marshal::Marshal;

/// Native pointer stored in a handle.
///
/// # Safety
/// `this` must point to a live handle.
#[inline]
pub unsafe fn native_of<V>(this: *const ForeignHandle<V>) -> *mut c_void {
    // SAFETY: caller guarantees `this` is a live handle
    unsafe { (*this).native }
}

/// The vtable of a native-side object.
///
/// # Safety
/// `native` must point to an object whose first field is a `*const N`, and
/// that table must outlive the call.
#[inline]
pub unsafe fn native_vtable<'a, N>(native: *mut c_void) -> &'a N {
    // SAFETY: caller guarantees the vtable-first layout
    unsafe { &**(native as *const *const N) }
}

/// Store an aggregate result through the caller's hidden return pointer and
/// hand the same pointer back, as the foreign ABI expects.
///
/// # Safety
/// `out` must be valid for writes of `T`.
#[inline]
pub unsafe fn write_hidden_return<T>(out: *mut T, value: T) -> *mut T {
    // SAFETY: caller guarantees `out` is writable
    unsafe { out.write(value) };
    out
}

/// Native copy of the value behind a `#[convert_pointee]` argument, `None`
/// for a null pointer.
///
/// # Safety
/// A non-null `foreign` must be valid for reads of `T`.
#[inline]
pub unsafe fn pointee_to_native<T: Marshal + Copy>(foreign: *const T) -> Option<T::Native> {
    if foreign.is_null() {
        return None;
    }
    // SAFETY: caller guarantees non-null pointers are readable
    Some(unsafe { foreign.read() }.to_native())
}

/// The pointer the native side receives for a converted pointee.
#[inline]
pub fn native_pointee<N>(copy: &mut Option<N>) -> *mut N {
    copy.as_mut().map_or(ptr::null_mut(), |native| native as *mut N)
}

/// Write a converted pointee back through the caller's pointer.
///
/// # Safety
/// If `copy` is `Some`, `foreign` must be valid for writes of `T`.
#[inline]
pub unsafe fn pointee_from_native<T: Marshal>(foreign: *mut T, copy: Option<T::Native>) {
    if let Some(native) = copy {
        // SAFETY: `copy` is only `Some` for a non-null caller pointer
        unsafe { foreign.write(T::from_native(native)) };
    }
}

/// Wrap an interface returned by the native side in the foreign handle of
/// `version`.
///
/// A null `native` stays null. An unreadable or unknown version is logged and
/// gives null; the native object is left to its owner.
///
/// # Safety
/// `version` must be null or NUL-terminated. A non-null `native` must
/// implement that version and outlive the handle.
pub unsafe fn wrap_interface(
    table: &ConstructorTable,
    version: *const c_char,
    native: *mut c_void,
) -> *mut c_void {
    if native.is_null() {
        return ptr::null_mut();
    }
    if version.is_null() {
        log::warn!("interface {:p} returned without a version string", native);
        return ptr::null_mut();
    }
    // SAFETY: caller guarantees a NUL-terminated string
    let Ok(version) = unsafe { CStr::from_ptr(version) }.to_str() else {
        log::warn!("interface {:p} returned with a non UTF-8 version string", native);
        return ptr::null_mut();
    };
    // SAFETY: forwarded to the caller
    match unsafe { table.create_interface(version, native) } {
        Ok(handle) => {
            log::debug!("wrapped returned {} {:p} as {:p}", version, native, handle);
            handle
        }
        Err(_) => ptr::null_mut(),
    }
}

/// Trace one adapter call.
#[inline]
pub fn trace_call(descriptor: &InterfaceDescriptor, slot: usize, this: *const c_void) {
    if log::log_enabled!(log::Level::Trace) {
        let method = descriptor
            .method_at(slot)
            .map_or("<reserved>", |method| method.name);
        log::trace!("{}::{} {:p}", descriptor.version, method, this);
    }
}

/// Abort after logging an infrastructure failure for `descriptor`.
///
/// Generated factories call this when the vtable for their version cannot be
/// built. The process cannot proceed without the interface.
#[cold]
pub fn fatal(descriptor: &InterfaceDescriptor, error: &dyn Display) -> ! {
    log::error!("{}: {}", descriptor.key(), error);
    std::process::abort()
}

/// Entry point of every reserved vtable slot.
#[cold]
pub fn reserved_slot_called(descriptor: &InterfaceDescriptor, slot: usize) -> ! {
    fatal(descriptor, &format_args!("reserved vtable slot {} was called", slot))
}
