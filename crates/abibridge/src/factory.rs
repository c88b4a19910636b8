//! Version-string constructor table
//!
//! Foreign code asks for interfaces by version string
//! (`"STEAMREMOTEPLAY_INTERFACE_VERSION002"`). Each version is an independent
//! descriptor/vtable/factory triple; a request for a version that was not
//! generated is an error, never a fallback to a neighbouring version.

use std::collections::HashMap;
use std::ffi::c_void;

use crate::descriptor::InterfaceDescriptor;
use crate::error::{BridgeError, Result};

/// Type-erased factory of one interface version.
#[derive(Debug, Clone, Copy)]
pub struct Constructor {
    pub version: &'static str,
    pub descriptor: &'static InterfaceDescriptor,
    /// Builds a handle around a native-side pointer, returned type-erased
    pub create: unsafe fn(*mut c_void) -> *mut c_void,
}

/// Lookup table from version string to [`Constructor`].
#[derive(Debug, Default)]
pub struct ConstructorTable {
    by_version: HashMap<&'static str, Constructor>,
}

impl ConstructorTable {
    /// Build a table from one or more constructor lists. A later entry for the
    /// same version replaces an earlier one.
    pub fn new<'a>(lists: impl IntoIterator<Item = &'a [Constructor]>) -> Self {
        let mut by_version = HashMap::new();
        for constructor in lists.into_iter().flatten() {
            if by_version.insert(constructor.version, *constructor).is_some() {
                log::warn!("duplicate constructor for {}", constructor.version);
            }
        }
        Self { by_version }
    }

    #[must_use]
    pub fn get(&self, version: &str) -> Option<&Constructor> {
        self.by_version.get(version)
    }

    /// Every version this table can construct, sorted.
    #[must_use]
    pub fn versions(&self) -> Vec<&'static str> {
        let mut versions: Vec<_> = self.by_version.keys().copied().collect();
        versions.sort_unstable();
        versions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_version.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_version.is_empty()
    }

    /// Create the foreign handle for `version` around `native`.
    ///
    /// # Safety
    /// `native` must point to a native-side object implementing exactly that
    /// interface version, and must outlive the returned handle.
    pub unsafe fn create_interface(&self, version: &str, native: *mut c_void) -> Result<*mut c_void> {
        let constructor = self.get(version).ok_or_else(|| {
            log::warn!("unknown interface version {}", version);
            BridgeError::UnknownVersion(version.to_owned())
        })?;
        // SAFETY: forwarded to the caller
        Ok(unsafe { (constructor.create)(native) })
    }
}
