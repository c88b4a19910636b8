//! Foreign-ABI vtable adapters over native-side objects
//!
//! This crate lets a foreign (Windows-ABI) caller use a native-side object
//! through the vtable layout it was compiled against. Each interface version
//! gets a foreign vtable whose slots are thunks: they unpack the handle,
//! convert arguments, call the native object exactly once and convert the
//! result back. Nothing else happens in a thunk.
//!
//! ## Calling conventions
//!
//! | Side | x86 | other targets |
//! |------|-----|---------------|
//! | foreign | `thiscall` (this in ECX) | `C` (this as first param) |
//! | native | `C` | `C` |
//!
//! ## Defining an interface
//! ```ignore
//! use abibridge::foreign_interface;
//!
//! #[foreign_interface(
//!     name = "ISteamRemotePlay",
//!     versions(
//!         v001 = "STEAMREMOTEPLAY_INTERFACE_VERSION001",
//!         v002 = "STEAMREMOTEPLAY_INTERFACE_VERSION002",
//!     )
//! )]
//! pub trait RemotePlay {
//!     #[sdk_name("GetSessionCount")]
//!     fn get_session_count(&self) -> u32;
//!
//!     #[sdk_name("GetSessionSteamID")]
//!     #[hidden_return]
//!     fn get_session_steam_id(&self, session_id: u32) -> SteamId;
//!
//!     #[only(v002)]
//!     #[sdk_name("BStartRemotePlayTogether")]
//!     fn start_remote_play_together(&self, show_overlay: bool) -> bool;
//! }
//!
//! // remote_play::v002::create(native) -> *mut remote_play::v002::Handle
//! ```
//!
//! ## Modules
//! - [`descriptor`] - interface descriptor schema
//! - [`layout`] - value kinds and per-ABI struct layout rules
//! - [`marshal`] - foreign/native value conversion
//! - [`vtable`] - the vtable registry (one table per interface version)
//! - [`handle`] - foreign object handles
//! - [`thunk`] - helpers called by generated thunks
//! - [`factory`] - version-string constructor table

pub mod descriptor;
pub mod error;
pub mod factory;
pub mod handle;
pub mod layout;
pub mod marshal;
pub mod thunk;
pub mod vtable;

pub use abibridge_macro::foreign_interface;

pub use descriptor::{InterfaceDescriptor, InterfaceKey, MethodDescriptor, ParamDescriptor};
pub use error::{BridgeError, Result};
pub use factory::{Constructor, ConstructorTable};
pub use handle::ForeignHandle;
pub use layout::{Abi, FieldLayout, StructLayout, ValueKind};
pub use marshal::Marshal;
pub use thunk::fatal;
pub use vtable::{RegisteredVtable, VtableRegistry, descriptor_of, registry};
