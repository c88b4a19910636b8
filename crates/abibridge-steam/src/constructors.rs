//! Version-string lookup for every interface this crate adapts

use std::ffi::c_void;

use abibridge::{ConstructorTable, Result};
use once_cell::sync::Lazy;

use crate::interface::remote_play;

static CONSTRUCTORS: Lazy<ConstructorTable> = Lazy::new(|| {
    let table = ConstructorTable::new([remote_play::CONSTRUCTORS]);
    log::debug!("constructor table: {:?}", table.versions());
    table
});

/// Table of every known interface version.
pub fn constructor_table() -> &'static ConstructorTable {
    &CONSTRUCTORS
}

/// Create the foreign handle for `version` around the native-side object.
///
/// Unknown versions are an error; there is no fallback to a neighbouring
/// version.
///
/// # Safety
/// `native` must point to a native-side object implementing exactly
/// `version`, and must outlive the returned handle.
pub unsafe fn create_win_interface(version: &str, native: *mut c_void) -> Result<*mut c_void> {
    // SAFETY: forwarded to the caller
    unsafe { constructor_table().create_interface(version, native) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abibridge::BridgeError;

    #[test]
    fn test_known_versions() {
        assert_eq!(
            constructor_table().versions(),
            vec![
                "STEAMREMOTEPLAY_INTERFACE_VERSION001",
                "STEAMREMOTEPLAY_INTERFACE_VERSION002",
            ]
        );
    }

    #[test]
    fn test_descriptor_per_version() {
        let v1 = constructor_table()
            .get("STEAMREMOTEPLAY_INTERFACE_VERSION001")
            .unwrap();
        let v2 = constructor_table()
            .get("STEAMREMOTEPLAY_INTERFACE_VERSION002")
            .unwrap();
        assert_eq!(v1.descriptor.slot_count, 7);
        assert_eq!(v2.descriptor.slot_count, 8);
        assert!(std::ptr::eq(v2.descriptor, &remote_play::v002::DESCRIPTOR));
    }

    #[test]
    fn test_unknown_version() {
        let err = unsafe {
            create_win_interface("STEAMREMOTEPLAY_INTERFACE_VERSION003", std::ptr::null_mut())
        };
        assert_eq!(
            err,
            Err(BridgeError::UnknownVersion(
                "STEAMREMOTEPLAY_INTERFACE_VERSION003".into()
            ))
        );
    }
}
