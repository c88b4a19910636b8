//! Error type for descriptor validation, vtable registration and lookup

use thiserror::Error;

use crate::descriptor::InterfaceKey;

/// Errors raised while building or looking up foreign interfaces.
///
/// None of these come from the adapters themselves: a thunk never fails,
/// native-side failures are ordinary return values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The interface descriptor is internally inconsistent
    #[error("invalid descriptor for {key}: {reason}")]
    Descriptor {
        /// Interface the descriptor belongs to
        key: InterfaceKey,
        /// What is wrong with it
        reason: String,
    },

    /// The vtable type does not have one pointer per descriptor slot
    #[error("vtable for {key} has {actual} slots, descriptor declares {expected}")]
    SlotCountMismatch {
        key: InterfaceKey,
        expected: usize,
        actual: usize,
    },

    /// A different vtable type is already registered under this key
    #[error("a different vtable layout is already registered for {key}")]
    LayoutConflict { key: InterfaceKey },

    /// No constructor exists for the requested interface version
    #[error("no interface registered for version '{0}'")]
    UnknownVersion(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;
