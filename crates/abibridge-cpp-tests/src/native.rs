//! C++ objects as the native side of a handle

// MSVC returns aggregates from member functions through a hidden pointer,
// and 32-bit SysV does the same for every struct, so the by-value
// GetSessionSteamID of CppRemotePlay only matches the C vtable elsewhere.
#![cfg(all(not(target_arch = "x86"), not(target_env = "msvc")))]

use super::*;
use abibridge_steam::remote_play::v002;
use abibridge_steam::{DeviceFormFactor, SteamId, create_win_interface};
use std::ffi::CStr;

/// Test that Rust foreign calls reach a C++ native object
#[test]
fn test_rust_calls_cpp_native() {
    let native = create_cpp_remote_play();
    unsafe {
        let handle = v002::create(native);
        let vtable = &*(*handle).vtable;

        assert_eq!((vtable.get_session_count)(handle), 2);
        assert_eq!((vtable.get_session_id)(handle, 1), 101);
        assert_eq!(
            (vtable.get_session_client_form_factor)(handle, 100),
            DeviceFormFactor::COMPUTER
        );

        let mut out = SteamId::NIL;
        let returned = (vtable.get_session_steam_id)(handle, &mut out, 100);
        assert_eq!(returned, &mut out as *mut SteamId);
        assert_eq!(out, SteamId(0x0110_0001_0000_0064));

        let name = (vtable.get_session_client_name)(handle, 100);
        assert_eq!(CStr::from_ptr(name).to_str(), Ok("cpp-host"));
        assert!((vtable.get_session_client_name)(handle, 7).is_null());

        let (mut x, mut y) = (0, 0);
        assert!((vtable.get_session_client_resolution)(handle, 101, &mut x, &mut y));
        assert_eq!((x, y), (1920, 1080));

        assert!((vtable.start_remote_play_together)(handle, true));
        assert!(cpp_overlay(native));

        assert!((vtable.send_remote_play_together_invite)(handle, SteamId(77)));
        assert_eq!(cpp_last_invite(native), 77);

        v002::release(handle);
    }
    delete_cpp_remote_play(native);
}

/// Test the full chain: C++ caller -> Rust thunk -> C++ native object
#[test]
fn test_cpp_to_cpp_through_handle() {
    let native = create_cpp_remote_play();
    unsafe {
        let handle =
            create_win_interface("STEAMREMOTEPLAY_INTERFACE_VERSION002", native).unwrap();

        assert_eq!(cpp_session_count(handle), 2);
        assert_eq!(cpp_session_steam_id(handle, 101), 0x0110_0001_0000_0065);
        assert_eq!(cpp_session_resolution(handle, 5), None);
        assert!(!cpp_send_invite(handle, 0));
        assert_eq!(cpp_last_invite(native), 0);

        v002::release(handle as *mut v002::Handle);
    }
    delete_cpp_remote_play(native);
}
