//! Builds `ISteamRemotePlay` handles for the requested versions around a
//! scripted native object and calls every slot the way a foreign caller would.

mod opts;

use std::ffi::{CStr, CString, c_char, c_void};
use std::process::ExitCode;

use abibridge::BridgeError;
use abibridge_steam::remote_play::{v001, v002};
use abibridge_steam::{
    DeviceFormFactor, RemotePlay, RemotePlaySessionId, SteamId, constructor_table,
    create_win_interface,
};

struct ScriptedSession {
    id: RemotePlaySessionId,
    owner: SteamId,
    name: CString,
    form_factor: DeviceFormFactor,
    resolution: (i32, i32),
}

/// Native-side implementation replaying a fixed set of sessions.
struct ScriptedRemotePlay {
    sessions: Vec<ScriptedSession>,
}

impl ScriptedRemotePlay {
    fn new() -> Self {
        let script = [
            ("living-room", DeviceFormFactor::TV, (3840, 2160)),
            ("phone", DeviceFormFactor::PHONE, (1170, 2532)),
        ];
        let sessions = script
            .into_iter()
            .zip(1u32..)
            .filter_map(|((name, form_factor, resolution), id)| {
                Some(ScriptedSession {
                    id,
                    owner: SteamId(0x0110_0001_0000_0000 | u64::from(id)),
                    name: CString::new(name).ok()?,
                    form_factor,
                    resolution,
                })
            })
            .collect();
        Self { sessions }
    }

    fn session(&self, id: RemotePlaySessionId) -> Option<&ScriptedSession> {
        self.sessions.iter().find(|session| session.id == id)
    }
}

impl RemotePlay for ScriptedRemotePlay {
    fn get_session_count(&self) -> u32 {
        self.sessions.len() as u32
    }

    fn get_session_id(&self, session_index: i32) -> RemotePlaySessionId {
        usize::try_from(session_index)
            .ok()
            .and_then(|index| self.sessions.get(index))
            .map_or(0, |session| session.id)
    }

    fn get_session_steam_id(&self, session_id: RemotePlaySessionId) -> SteamId {
        self.session(session_id)
            .map_or(SteamId::NIL, |session| session.owner)
    }

    fn get_session_client_name(&self, session_id: RemotePlaySessionId) -> *const c_char {
        self.session(session_id)
            .map_or(std::ptr::null(), |session| session.name.as_ptr())
    }

    fn get_session_client_form_factor(&self, session_id: RemotePlaySessionId) -> DeviceFormFactor {
        self.session(session_id)
            .map_or(DeviceFormFactor::UNKNOWN, |session| session.form_factor)
    }

    fn get_session_client_resolution(
        &self,
        session_id: RemotePlaySessionId,
        resolution_x: *mut i32,
        resolution_y: *mut i32,
    ) -> bool {
        let Some(session) = self.session(session_id) else {
            return false;
        };
        // SAFETY: the caller passes writable out-parameters
        unsafe {
            *resolution_x = session.resolution.0;
            *resolution_y = session.resolution.1;
        }
        true
    }

    fn start_remote_play_together(&mut self, show_overlay: bool) -> bool {
        log::info!("remote play together started (overlay: {})", show_overlay);
        true
    }

    fn send_remote_play_together_invite(&mut self, friend: SteamId) -> bool {
        log::info!("invite sent to {:#018x}", friend.0);
        friend != SteamId::NIL
    }
}

fn client_name(name: *const c_char) -> String {
    if name.is_null() {
        return "<none>".into();
    }
    // SAFETY: non-null names are NUL-terminated and owned by the native object
    unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
}

// Calls shared by every version; the vtable types differ, the slots used
// here have the same names in each.
macro_rules! drive_sessions {
    ($module:ident, $handle:expr) => {{
        let handle = $handle as *mut $module::Handle;
        // SAFETY: `handle` was just built for this version
        let vtable = unsafe { &*(*handle).vtable };
        let count = unsafe { (vtable.get_session_count)(handle) };
        println!("  sessions: {}", count);

        for index in 0..count as i32 {
            let id = unsafe { (vtable.get_session_id)(handle, index) };
            let mut owner = SteamId::NIL;
            unsafe { (vtable.get_session_steam_id)(handle, &mut owner, id) };
            let name = unsafe { (vtable.get_session_client_name)(handle, id) };
            let form_factor = unsafe { (vtable.get_session_client_form_factor)(handle, id) };
            let (mut x, mut y) = (0i32, 0i32);
            let has_resolution =
                unsafe { (vtable.get_session_client_resolution)(handle, id, &mut x, &mut y) };

            println!(
                "  [{}] id={} owner={:#018x} name={} form_factor={} resolution={}",
                index,
                id,
                owner.0,
                client_name(name),
                form_factor.name().unwrap_or("?"),
                if has_resolution {
                    format!("{}x{}", x, y)
                } else {
                    "-".into()
                },
            );
        }

        let invited =
            unsafe { (vtable.send_remote_play_together_invite)(handle, SteamId(0x0110_0001_0000_0042)) };
        println!("  invite accepted: {}", invited);
        (handle, vtable)
    }};
}

fn run(version: &str) -> Result<(), BridgeError> {
    let constructor = constructor_table()
        .get(version)
        .ok_or_else(|| BridgeError::UnknownVersion(version.to_owned()))?;
    let descriptor = constructor.descriptor;

    println!("{} ({} slots)", descriptor.key(), descriptor.slot_count);
    for method in descriptor.methods {
        println!(
            "  slot {}: {} ({} stack bytes)",
            method.slot,
            method.name,
            method.stack_bytes()
        );
    }

    let native: *mut c_void = if version == v001::VERSION {
        v001::NativeObject::new(ScriptedRemotePlay::new()).into_raw()
    } else {
        v002::NativeObject::new(ScriptedRemotePlay::new()).into_raw()
    };

    // SAFETY: `native` was built for exactly this version and outlives the handle
    let raw = unsafe { create_win_interface(version, native)? };

    if version == v001::VERSION {
        let (handle, _) = drive_sessions!(v001, raw);
        // SAFETY: handle and native object were created above and are not reused
        unsafe {
            v001::release(handle);
            drop(v001::NativeObject::from_raw(native));
        }
    } else {
        let (handle, vtable) = drive_sessions!(v002, raw);
        let started = unsafe { (vtable.start_remote_play_together)(handle, true) };
        println!("  remote play together: {}", started);
        // SAFETY: handle and native object were created above and are not reused
        unsafe {
            v002::release(handle);
            drop(v002::NativeObject::from_raw(native));
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let opts = opts::from_args();

    if let Err(err) = simplelog::TermLogger::init(
        opts.log_verbosity.level(),
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    ) {
        eprintln!("[ERROR] failed to initialize logging: {}", err);
    }

    let versions: Vec<String> = if opts.versions.is_empty() {
        constructor_table()
            .versions()
            .into_iter()
            .map(String::from)
            .collect()
    } else {
        opts.versions
    };

    let mut status = ExitCode::SUCCESS;
    for version in &versions {
        if let Err(err) = run(version) {
            log::error!("{}", err);
            status = ExitCode::FAILURE;
        }
    }
    status
}
