//! C++ callers using Rust-built foreign handles

// GCC member functions on 32-bit x86 are not thiscall
#![cfg(any(not(target_arch = "x86"), target_env = "msvc"))]

use super::*;
use abibridge_steam::remote_play::{v001, v002};
use abibridge_steam::{DeviceFormFactor, RemotePlay, RemotePlaySessionId, SteamId};
use std::cell::Cell;
use std::ffi::{CStr, CString};
use std::rc::Rc;

struct Host {
    name: CString,
    overlay: Rc<Cell<Option<bool>>>,
    invited: Rc<Cell<u64>>,
}

impl Host {
    fn new() -> Self {
        Self {
            name: CString::new("rust-host").unwrap(),
            overlay: Rc::new(Cell::new(None)),
            invited: Rc::new(Cell::new(0)),
        }
    }
}

impl RemotePlay for Host {
    fn get_session_count(&self) -> u32 {
        1
    }

    fn get_session_id(&self, session_index: i32) -> RemotePlaySessionId {
        if session_index == 0 { 0x5E55_0001 } else { 0 }
    }

    fn get_session_steam_id(&self, session_id: RemotePlaySessionId) -> SteamId {
        SteamId(0x0110_0001_0000_0000 | session_id as u64)
    }

    fn get_session_client_name(&self, _session_id: RemotePlaySessionId) -> *const c_char {
        self.name.as_ptr()
    }

    fn get_session_client_form_factor(&self, _session_id: RemotePlaySessionId) -> DeviceFormFactor {
        DeviceFormFactor::TABLET
    }

    fn get_session_client_resolution(
        &self,
        _session_id: RemotePlaySessionId,
        resolution_x: *mut i32,
        resolution_y: *mut i32,
    ) -> bool {
        unsafe {
            *resolution_x = 2560;
            *resolution_y = 1440;
        }
        true
    }

    fn start_remote_play_together(&mut self, show_overlay: bool) -> bool {
        self.overlay.set(Some(show_overlay));
        true
    }

    fn send_remote_play_together_invite(&mut self, friend: SteamId) -> bool {
        self.invited.set(friend.0);
        true
    }
}

/// Test that C++ virtual calls land in the Rust implementation
#[test]
fn test_cpp_calls_rust_handle() {
    let host = Host::new();
    let overlay = host.overlay.clone();
    let invited = host.invited.clone();
    let native = v002::NativeObject::new(host).into_raw();

    unsafe {
        let handle = v002::create(native) as *mut c_void;

        assert_eq!(cpp_session_count(handle), 1);
        assert_eq!(cpp_session_id(handle, 0), 0x5E55_0001);
        assert_eq!(cpp_session_id(handle, 4), 0);
        assert_eq!(cpp_session_form_factor(handle, 0x5E55_0001), 2);
        assert_eq!(cpp_session_resolution(handle, 0x5E55_0001), Some((2560, 1440)));

        let name = cpp_session_client_name(handle, 0x5E55_0001);
        assert_eq!(CStr::from_ptr(name).to_str(), Ok("rust-host"));

        assert!(cpp_start_together(handle, true));
        assert_eq!(overlay.get(), Some(true));

        assert!(cpp_send_invite(handle, 0x0110_0001_0000_4242));
        assert_eq!(invited.get(), 0x0110_0001_0000_4242);

        v002::release(handle as *mut v002::Handle);
        drop(v002::NativeObject::from_raw(native));
    }
}

/// Test that the hidden return pointer survives a real C++ call
#[test]
fn test_cpp_hidden_return() {
    let native = v002::NativeObject::new(Host::new()).into_raw();
    unsafe {
        let handle = v002::create(native) as *mut c_void;
        assert_eq!(cpp_session_steam_id(handle, 0x22), 0x0110_0001_0000_0022);
        v002::release(handle as *mut v002::Handle);
        drop(v002::NativeObject::from_raw(native));
    }
}

/// Test that a version 001 caller reaches the invite at slot 6
#[test]
fn test_cpp_calls_v001_handle() {
    let host = Host::new();
    let invited = host.invited.clone();
    let overlay = host.overlay.clone();
    let native = v001::NativeObject::new(host).into_raw();

    unsafe {
        let handle = v001::create(native) as *mut c_void;
        assert!(cpp_send_invite_v001(handle, 0x0110_0001_0000_0101));
        v001::release(handle as *mut v001::Handle);
        drop(v001::NativeObject::from_raw(native));
    }

    assert_eq!(invited.get(), 0x0110_0001_0000_0101);
    assert_eq!(overlay.get(), None);
}
