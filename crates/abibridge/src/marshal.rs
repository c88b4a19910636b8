//! Conversion of values between their foreign and native representation
//!
//! Every parameter and return type of a foreign interface implements
//! [`Marshal`]. Scalars, raw pointers, `Option<NonNull<T>>` and `extern "C"`
//! function pointers have the same representation on both sides and convert
//! by identity. Records implement the trait by hand: by identity when
//! [`StructLayout::needs_conversion_on_host`](crate::StructLayout::needs_conversion_on_host)
//! is false, field by field into a differently laid out native type otherwise.
//! The native type is chosen per target width with `cfg(target_pointer_width)`.
//!
//! A pointer argument is passed through as-is unless the method marks it
//! `#[convert_pointee]`. The thunk then converts a copy of the pointee, hands
//! the native side a pointer to that copy and, for `*mut` parameters, writes
//! the copy back once the call returns.

use std::ptr::NonNull;

use crate::layout::ValueKind;

/// A value that can cross the foreign/native boundary.
pub trait Marshal: Sized {
    /// Representation on the native side.
    type Native;

    /// Kind recorded in the interface descriptor.
    const KIND: ValueKind;

    /// Foreign -> native, applied to every argument.
    fn to_native(self) -> Self::Native;

    /// Native -> foreign, applied to every result.
    fn from_native(native: Self::Native) -> Self;
}

macro_rules! identity_marshal {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Marshal for $ty {
                type Native = $ty;
                const KIND: ValueKind = ValueKind::$kind;

                #[inline]
                fn to_native(self) -> Self::Native {
                    self
                }

                #[inline]
                fn from_native(native: Self::Native) -> Self {
                    native
                }
            }
        )*
    };
}

identity_marshal! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

impl<T> Marshal for *const T {
    type Native = *const T;
    const KIND: ValueKind = ValueKind::Pointer;

    #[inline]
    fn to_native(self) -> Self::Native {
        self
    }

    #[inline]
    fn from_native(native: Self::Native) -> Self {
        native
    }
}

impl<T> Marshal for *mut T {
    type Native = *mut T;
    const KIND: ValueKind = ValueKind::Pointer;

    #[inline]
    fn to_native(self) -> Self::Native {
        self
    }

    #[inline]
    fn from_native(native: Self::Native) -> Self {
        native
    }
}

impl<T> Marshal for Option<NonNull<T>> {
    type Native = Option<NonNull<T>>;
    const KIND: ValueKind = ValueKind::Pointer;

    #[inline]
    fn to_native(self) -> Self::Native {
        self
    }

    #[inline]
    fn from_native(native: Self::Native) -> Self {
        native
    }
}

macro_rules! fn_pointer_arities {
    ($($($arg:ident),*;)*) => {
        $(
            impl<R $(, $arg)*> Marshal for extern "C" fn($($arg),*) -> R {
                type Native = Self;
                const KIND: ValueKind = ValueKind::Pointer;

                #[inline]
                fn to_native(self) -> Self::Native {
                    self
                }

                #[inline]
                fn from_native(native: Self::Native) -> Self {
                    native
                }
            }

            impl<R $(, $arg)*> Marshal for unsafe extern "C" fn($($arg),*) -> R {
                type Native = Self;
                const KIND: ValueKind = ValueKind::Pointer;

                #[inline]
                fn to_native(self) -> Self::Native {
                    self
                }

                #[inline]
                fn from_native(native: Self::Native) -> Self {
                    native
                }
            }

            impl<R $(, $arg)*> Marshal for Option<extern "C" fn($($arg),*) -> R> {
                type Native = Self;
                const KIND: ValueKind = ValueKind::Pointer;

                #[inline]
                fn to_native(self) -> Self::Native {
                    self
                }

                #[inline]
                fn from_native(native: Self::Native) -> Self {
                    native
                }
            }

            impl<R $(, $arg)*> Marshal for Option<unsafe extern "C" fn($($arg),*) -> R> {
                type Native = Self;
                const KIND: ValueKind = ValueKind::Pointer;

                #[inline]
                fn to_native(self) -> Self::Native {
                    self
                }

                #[inline]
                fn from_native(native: Self::Native) -> Self {
                    native
                }
            }
        )*
    };
}

// Callbacks up to four arguments
fn_pointer_arities! {
    ;
    A;
    A, B;
    A, B, C;
    A, B, C, D;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{FieldLayout, StructLayout};
    use std::ffi::c_void;

    #[test]
    fn test_scalars_are_identity() {
        assert_eq!(42u32.to_native(), 42);
        assert_eq!(<i32 as Marshal>::from_native(-7), -7);
        assert!(true.to_native());
        assert_eq!(u64::MAX.to_native(), u64::MAX);
    }

    #[test]
    fn test_float_bits_survive() {
        let value = f64::from_bits(0x7ff8_0000_dead_beef);
        assert_eq!(value.to_native().to_bits(), 0x7ff8_0000_dead_beef);
    }

    #[test]
    fn test_pointers_are_identity() {
        let mut slot = 0i32;
        let ptr: *mut i32 = &mut slot;
        assert_eq!(ptr.to_native(), ptr);
        assert_eq!(<*mut c_void as Marshal>::KIND, ValueKind::Pointer);
    }

    extern "C" fn on_done(_code: i32) {}

    #[test]
    fn test_nullable_pointers_are_identity() {
        let mut slot = 3u8;
        let some = NonNull::new(&mut slot as *mut u8);
        assert_eq!(some.to_native(), some);
        assert_eq!(<Option<NonNull<u8>> as Marshal>::from_native(None), None);
        assert_eq!(<Option<NonNull<u8>> as Marshal>::KIND, ValueKind::Pointer);

        let callback: Option<extern "C" fn(i32)> = Some(on_done);
        assert_eq!(callback.to_native().map(|f| f as usize), Some(on_done as usize));
        assert_eq!(<Option<extern "C" fn(i32)> as Marshal>::KIND, ValueKind::Pointer);
        assert_eq!(
            <unsafe extern "C" fn(*mut c_void, u32) -> bool as Marshal>::KIND,
            ValueKind::Pointer
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(<u8 as Marshal>::KIND, ValueKind::U8);
        assert_eq!(<f32 as Marshal>::KIND, ValueKind::F32);
        assert_eq!(<*const u8 as Marshal>::KIND, ValueKind::Pointer);
    }

    // Win32 view of { uint32 count; uint64 id; }
    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct WinCounted {
        count: u32,
        id: u64,
    }

    // Unix32 view of the same record, the native representation on 32-bit targets
    #[repr(C, packed(4))]
    #[derive(Clone, Copy)]
    struct UnixCounted {
        count: u32,
        id: u64,
    }

    const COUNTED: StructLayout = StructLayout::new(
        "Counted",
        &[
            FieldLayout::new("count", ValueKind::U32),
            FieldLayout::new("id", ValueKind::U64),
        ],
    );

    impl Marshal for WinCounted {
        type Native = UnixCounted;
        const KIND: ValueKind = ValueKind::Record(&COUNTED);

        fn to_native(self) -> UnixCounted {
            UnixCounted {
                count: self.count,
                id: self.id,
            }
        }

        fn from_native(native: UnixCounted) -> Self {
            Self {
                count: native.count,
                id: native.id,
            }
        }
    }

    #[test]
    fn test_record_conversion_preserves_fields() {
        let value = WinCounted {
            count: 3,
            id: 0x0110_0001_0000_0042,
        };
        let native = value.to_native();
        assert_eq!(std::mem::size_of_val(&native), 12);
        assert_eq!(WinCounted::from_native(native), value);
        assert!(matches!(WinCounted::KIND, ValueKind::Record(layout) if layout.needs_conversion()));
    }
}
