//! SDK value types used by `ISteamRemotePlay`

use abibridge::{FieldLayout, Marshal, StructLayout, ValueKind};

/// Handle of one Remote Play session (`RemotePlaySessionID_t`).
pub type RemotePlaySessionId = u32;

/// `CSteamID`: a 64-bit account identifier, passed as an 8-byte record.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SteamId(pub u64);

impl SteamId {
    pub const NIL: SteamId = SteamId(0);

    /// Account id (low 32 bits).
    #[must_use]
    pub const fn account_id(self) -> u32 {
        self.0 as u32
    }
}

/// Record layout of `CSteamID`. A single 64-bit field sits at offset 0 on
/// every ABI, so values cross by plain copy.
pub const STEAM_ID_LAYOUT: StructLayout =
    StructLayout::new("CSteamID", &[FieldLayout::new("bits", ValueKind::U64)]);

impl Marshal for SteamId {
    type Native = SteamId;
    const KIND: ValueKind = ValueKind::Record(&STEAM_ID_LAYOUT);

    #[inline]
    fn to_native(self) -> Self::Native {
        self
    }

    #[inline]
    fn from_native(native: Self::Native) -> Self {
        native
    }
}

/// `ESteamDeviceFormFactor`. Kept as a raw `i32` so values outside the known
/// set pass through unchanged.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceFormFactor(pub i32);

impl DeviceFormFactor {
    pub const UNKNOWN: DeviceFormFactor = DeviceFormFactor(0);
    pub const PHONE: DeviceFormFactor = DeviceFormFactor(1);
    pub const TABLET: DeviceFormFactor = DeviceFormFactor(2);
    pub const COMPUTER: DeviceFormFactor = DeviceFormFactor(3);
    pub const TV: DeviceFormFactor = DeviceFormFactor(4);

    /// SDK spelling, `None` for values outside the known set.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::UNKNOWN => Some("k_ESteamDeviceFormFactorUnknown"),
            Self::PHONE => Some("k_ESteamDeviceFormFactorPhone"),
            Self::TABLET => Some("k_ESteamDeviceFormFactorTablet"),
            Self::COMPUTER => Some("k_ESteamDeviceFormFactorComputer"),
            Self::TV => Some("k_ESteamDeviceFormFactorTV"),
            _ => None,
        }
    }
}

impl Marshal for DeviceFormFactor {
    type Native = DeviceFormFactor;
    const KIND: ValueKind = ValueKind::I32;

    #[inline]
    fn to_native(self) -> Self::Native {
        self
    }

    #[inline]
    fn from_native(native: Self::Native) -> Self {
        native
    }
}
