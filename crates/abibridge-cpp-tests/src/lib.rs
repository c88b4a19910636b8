//! C++ interop tests for abibridge
//!
//! Two directions are covered:
//! - a C++ caller holds a Rust-built `ISteamRemotePlay` handle and makes real
//!   virtual calls through it (`caller`)
//! - a C++ object is the native side behind a handle (`native`)
//!
//! The C++ interface classes below spell out the foreign ABI directly:
//! `GetSessionSteamID` takes the hidden return pointer as an explicit
//! parameter so the declaration means the same thing on every compiler.
//!
//! Run with: `cargo test -p abibridge-cpp-tests`

#![recursion_limit = "1024"]
use cpp::cpp;
#[cfg(test)]
use std::ffi::{c_char, c_void};

#[cfg(test)]
mod caller;
#[cfg(test)]
mod native;

// =============================================================================
// C++ code
// =============================================================================

cpp! {{
    #include <cstdint>
    #include <cstring>

    struct CSteamIDBits {
        uint64_t bits;
    };

    // Foreign layout of STEAMREMOTEPLAY_INTERFACE_VERSION001
    class ISteamRemotePlay001 {
    public:
        virtual uint32_t GetSessionCount() = 0;
        virtual uint32_t GetSessionID(int32_t index) = 0;
        virtual CSteamIDBits* GetSessionSteamID(CSteamIDBits* ret, uint32_t session) = 0;
        virtual const char* GetSessionClientName(uint32_t session) = 0;
        virtual int32_t GetSessionClientFormFactor(uint32_t session) = 0;
        virtual bool BGetSessionClientResolution(uint32_t session, int32_t* x, int32_t* y) = 0;
        virtual bool BSendRemotePlayTogetherInvite(CSteamIDBits friend_id) = 0;
    };

    // Foreign layout of STEAMREMOTEPLAY_INTERFACE_VERSION002
    class ISteamRemotePlay002 {
    public:
        virtual uint32_t GetSessionCount() = 0;
        virtual uint32_t GetSessionID(int32_t index) = 0;
        virtual CSteamIDBits* GetSessionSteamID(CSteamIDBits* ret, uint32_t session) = 0;
        virtual const char* GetSessionClientName(uint32_t session) = 0;
        virtual int32_t GetSessionClientFormFactor(uint32_t session) = 0;
        virtual bool BGetSessionClientResolution(uint32_t session, int32_t* x, int32_t* y) = 0;
        virtual bool BStartRemotePlayTogether(bool show_overlay) = 0;
        virtual bool BSendRemotePlayTogetherInvite(CSteamIDBits friend_id) = 0;
    };

    // Native-side object for version 002: vtable first, methods by value
    class CppRemotePlay {
    public:
        uint64_t last_invite = 0;
        bool overlay = false;

        virtual uint32_t GetSessionCount() { return 2; }

        virtual uint32_t GetSessionID(int32_t index) {
            return index >= 0 && index < 2 ? 100 + index : 0;
        }

        virtual CSteamIDBits GetSessionSteamID(uint32_t session) {
            CSteamIDBits id;
            id.bits = 0x0110000100000000ull | session;
            return id;
        }

        virtual const char* GetSessionClientName(uint32_t session) {
            return session == 100 ? "cpp-host" : nullptr;
        }

        virtual int32_t GetSessionClientFormFactor(uint32_t) { return 3; }

        virtual bool BGetSessionClientResolution(uint32_t session, int32_t* x, int32_t* y) {
            if (session != 100 && session != 101) {
                return false;
            }
            *x = 1920;
            *y = 1080;
            return true;
        }

        virtual bool BStartRemotePlayTogether(bool show_overlay) {
            overlay = show_overlay;
            return true;
        }

        virtual bool BSendRemotePlayTogetherInvite(CSteamIDBits friend_id) {
            last_invite = friend_id.bits;
            return friend_id.bits != 0;
        }
    };
}}

// =============================================================================
// C++ callers (virtual calls through a foreign handle)
// =============================================================================

#[cfg(test)]
fn cpp_session_count(iface: *mut c_void) -> u32 {
    cpp!(unsafe [iface as "ISteamRemotePlay002*"] -> u32 as "uint32_t" {
        return iface->GetSessionCount();
    })
}

#[cfg(test)]
fn cpp_session_id(iface: *mut c_void, index: i32) -> u32 {
    cpp!(unsafe [iface as "ISteamRemotePlay002*", index as "int32_t"] -> u32 as "uint32_t" {
        return iface->GetSessionID(index);
    })
}

/// Returns the Steam ID, or 0 if the callee did not hand back the caller's
/// return pointer.
#[cfg(test)]
fn cpp_session_steam_id(iface: *mut c_void, session: u32) -> u64 {
    cpp!(unsafe [iface as "ISteamRemotePlay002*", session as "uint32_t"] -> u64 as "uint64_t" {
        CSteamIDBits out = {0};
        CSteamIDBits* r = iface->GetSessionSteamID(&out, session);
        return r == &out ? out.bits : 0;
    })
}

#[cfg(test)]
fn cpp_session_client_name(iface: *mut c_void, session: u32) -> *const c_char {
    cpp!(unsafe [iface as "ISteamRemotePlay002*", session as "uint32_t"] -> *const c_char as "const char*" {
        return iface->GetSessionClientName(session);
    })
}

#[cfg(test)]
fn cpp_session_form_factor(iface: *mut c_void, session: u32) -> i32 {
    cpp!(unsafe [iface as "ISteamRemotePlay002*", session as "uint32_t"] -> i32 as "int32_t" {
        return iface->GetSessionClientFormFactor(session);
    })
}

#[cfg(test)]
fn cpp_session_resolution(iface: *mut c_void, session: u32) -> Option<(i32, i32)> {
    let mut x = 0i32;
    let mut y = 0i32;
    let px = &mut x as *mut i32;
    let py = &mut y as *mut i32;
    let ok = cpp!(unsafe [iface as "ISteamRemotePlay002*", session as "uint32_t", px as "int32_t*", py as "int32_t*"] -> bool as "bool" {
        return iface->BGetSessionClientResolution(session, px, py);
    });
    ok.then_some((x, y))
}

#[cfg(test)]
fn cpp_start_together(iface: *mut c_void, show_overlay: bool) -> bool {
    cpp!(unsafe [iface as "ISteamRemotePlay002*", show_overlay as "bool"] -> bool as "bool" {
        return iface->BStartRemotePlayTogether(show_overlay);
    })
}

#[cfg(test)]
fn cpp_send_invite(iface: *mut c_void, friend_id: u64) -> bool {
    cpp!(unsafe [iface as "ISteamRemotePlay002*", friend_id as "uint64_t"] -> bool as "bool" {
        CSteamIDBits id;
        id.bits = friend_id;
        return iface->BSendRemotePlayTogetherInvite(id);
    })
}

#[cfg(test)]
fn cpp_send_invite_v001(iface: *mut c_void, friend_id: u64) -> bool {
    cpp!(unsafe [iface as "ISteamRemotePlay001*", friend_id as "uint64_t"] -> bool as "bool" {
        CSteamIDBits id;
        id.bits = friend_id;
        return iface->BSendRemotePlayTogetherInvite(id);
    })
}

// =============================================================================
// C++ native objects
// =============================================================================

#[cfg(test)]
fn create_cpp_remote_play() -> *mut c_void {
    cpp!(unsafe [] -> *mut c_void as "void*" {
        return new CppRemotePlay();
    })
}

#[cfg(test)]
fn cpp_last_invite(native: *mut c_void) -> u64 {
    cpp!(unsafe [native as "CppRemotePlay*"] -> u64 as "uint64_t" {
        return native->last_invite;
    })
}

#[cfg(test)]
fn cpp_overlay(native: *mut c_void) -> bool {
    cpp!(unsafe [native as "CppRemotePlay*"] -> bool as "bool" {
        return native->overlay;
    })
}

#[cfg(test)]
fn delete_cpp_remote_play(native: *mut c_void) {
    cpp!(unsafe [native as "CppRemotePlay*"] {
        delete native;
    })
}
