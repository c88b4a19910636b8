//! `ISteamRemotePlay` adapters
//!
//! Hands a Windows-ABI caller an `ISteamRemotePlay` object (version 001 or
//! 002) backed by a native-side implementation.
//!
//! ```ignore
//! use abibridge_steam::{RemotePlay, create_win_interface, remote_play};
//!
//! let native = remote_play::v002::NativeObject::new(MyRemotePlay::default()).into_raw();
//! let handle = unsafe {
//!     create_win_interface("STEAMREMOTEPLAY_INTERFACE_VERSION002", native)?
//! };
//! ```

pub mod constructors;
pub mod interface;
pub mod types;

pub use constructors::{constructor_table, create_win_interface};
pub use interface::{RemotePlay, remote_play};
pub use types::{DeviceFormFactor, RemotePlaySessionId, STEAM_ID_LAYOUT, SteamId};
