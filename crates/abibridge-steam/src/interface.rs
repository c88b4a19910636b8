//! `ISteamRemotePlay`, versions 001 and 002
//!
//! The macro generates `remote_play::v001` and `remote_play::v002`, each with
//! its own descriptor, foreign vtable, native vtable and factory. Version 002
//! inserts `BStartRemotePlayTogether` before the invite method, which shifts
//! the invite from slot 6 to slot 7.

use std::ffi::c_char;

use abibridge::foreign_interface;

use crate::types::{DeviceFormFactor, RemotePlaySessionId, SteamId};

#[foreign_interface(
    name = "ISteamRemotePlay",
    versions(
        v001 = "STEAMREMOTEPLAY_INTERFACE_VERSION001",
        v002 = "STEAMREMOTEPLAY_INTERFACE_VERSION002",
    )
)]
pub trait RemotePlay {
    /// Number of connected Remote Play sessions.
    #[sdk_name("GetSessionCount")]
    fn get_session_count(&self) -> u32;

    /// Session at `session_index`, 0 when out of range.
    #[sdk_name("GetSessionID")]
    fn get_session_id(&self, session_index: i32) -> RemotePlaySessionId;

    #[sdk_name("GetSessionSteamID")]
    #[hidden_return]
    fn get_session_steam_id(&self, session_id: RemotePlaySessionId) -> SteamId;

    /// Borrowed UTF-8 name, owned by the native side.
    #[sdk_name("GetSessionClientName")]
    fn get_session_client_name(&self, session_id: RemotePlaySessionId) -> *const c_char;

    #[sdk_name("GetSessionClientFormFactor")]
    fn get_session_client_form_factor(&self, session_id: RemotePlaySessionId) -> DeviceFormFactor;

    #[sdk_name("BGetSessionClientResolution")]
    fn get_session_client_resolution(
        &self,
        session_id: RemotePlaySessionId,
        resolution_x: *mut i32,
        resolution_y: *mut i32,
    ) -> bool;

    #[only(v002)]
    #[sdk_name("BStartRemotePlayTogether")]
    fn start_remote_play_together(&mut self, show_overlay: bool) -> bool;

    #[sdk_name("BSendRemotePlayTogetherInvite")]
    fn send_remote_play_together_invite(&mut self, friend: SteamId) -> bool;
}
