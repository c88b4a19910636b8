//! Value kinds and struct layout rules across the four ABIs
//!
//! The foreign side (Windows) and the native side (Unix) agree on scalar sizes
//! but not on every alignment. On 32-bit Unix, 64-bit scalars inside a record
//! are only 4-byte aligned; on Win32 they are 8-byte aligned. A record whose
//! field offsets differ between the two sides cannot be passed by plain copy.
//!
//! ```text
//! struct { uint32 a; uint64 b; }
//!
//!            offset(a)  offset(b)  size
//! Win32          0          8       16
//! Unix32         0          4       12   <- needs conversion
//! Win64/Unix64   0          8       16
//! ```
//!
//! Only one width is built at a time. [`StructLayout::needs_conversion_on_host`]
//! answers for the width of the current target and decides which native
//! representation a record's `Marshal` impl must use there.

/// Target ABI a layout is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Abi {
    Win32,
    Win64,
    Unix32,
    Unix64,
}

impl Abi {
    /// All four ABIs, in the order layouts are compared.
    pub const ALL: [Abi; 4] = [Abi::Unix32, Abi::Unix64, Abi::Win32, Abi::Win64];

    /// Native ABI of the current build target.
    pub const HOST: Abi = if cfg!(target_pointer_width = "64") {
        Abi::Unix64
    } else {
        Abi::Unix32
    };

    /// The ABI of the same width on the other side of the boundary.
    #[must_use]
    pub const fn peer(self) -> Abi {
        match self {
            Abi::Win32 => Abi::Unix32,
            Abi::Win64 => Abi::Unix64,
            Abi::Unix32 => Abi::Win32,
            Abi::Unix64 => Abi::Win64,
        }
    }

    /// Pointer width in bytes.
    #[must_use]
    pub const fn pointer_size(self) -> usize {
        match self {
            Abi::Win32 | Abi::Unix32 => 4,
            Abi::Win64 | Abi::Unix64 => 8,
        }
    }
}

/// Kind of a value crossing the ABI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Void,
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Pointer,
    Record(&'static StructLayout),
}

impl ValueKind {
    /// Size in bytes under `abi`.
    #[must_use]
    pub fn size(&self, abi: Abi) -> usize {
        match self {
            ValueKind::Void => 0,
            ValueKind::Bool | ValueKind::I8 | ValueKind::U8 => 1,
            ValueKind::I16 | ValueKind::U16 => 2,
            ValueKind::I32 | ValueKind::U32 | ValueKind::F32 => 4,
            ValueKind::I64 | ValueKind::U64 | ValueKind::F64 => 8,
            ValueKind::Pointer => abi.pointer_size(),
            ValueKind::Record(layout) => layout.size(abi),
        }
    }

    /// Alignment in bytes when the value is a record field under `abi`.
    #[must_use]
    pub fn align(&self, abi: Abi) -> usize {
        match self {
            ValueKind::Void => 1,
            ValueKind::I64 | ValueKind::U64 | ValueKind::F64 if abi == Abi::Unix32 => 4,
            ValueKind::Record(layout) => layout.align(abi),
            other => other.size(abi),
        }
    }

    /// True for aggregate values.
    #[must_use]
    pub const fn is_record(&self) -> bool {
        matches!(self, ValueKind::Record(_))
    }
}

/// One field of a [`StructLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: &'static str,
    pub kind: ValueKind,
}

impl FieldLayout {
    pub const fn new(name: &'static str, kind: ValueKind) -> Self {
        Self { name, kind }
    }
}

/// Field list of an SDK record, independent of any ABI.
#[derive(Debug, PartialEq, Eq)]
pub struct StructLayout {
    pub name: &'static str,
    pub fields: &'static [FieldLayout],
    /// Maximum field alignment, as set by `#pragma pack(N)`.
    pub pack: Option<usize>,
}

fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

impl StructLayout {
    pub const fn new(name: &'static str, fields: &'static [FieldLayout]) -> Self {
        Self {
            name,
            fields,
            pack: None,
        }
    }

    pub const fn packed(name: &'static str, fields: &'static [FieldLayout], pack: usize) -> Self {
        Self {
            name,
            fields,
            pack: Some(pack),
        }
    }

    fn field_align(&self, kind: &ValueKind, abi: Abi) -> usize {
        let natural = kind.align(abi);
        match self.pack {
            Some(pack) => natural.min(pack),
            None => natural,
        }
    }

    /// Byte offset of every field under `abi`, in declaration order.
    #[must_use]
    pub fn offsets(&self, abi: Abi) -> Vec<usize> {
        let mut offset = 0;
        self.fields
            .iter()
            .map(|field| {
                offset = align_up(offset, self.field_align(&field.kind, abi));
                let start = offset;
                offset += field.kind.size(abi);
                start
            })
            .collect()
    }

    /// Record alignment under `abi`.
    #[must_use]
    pub fn align(&self, abi: Abi) -> usize {
        self.fields
            .iter()
            .map(|field| self.field_align(&field.kind, abi))
            .max()
            .unwrap_or(1)
    }

    /// Record size under `abi`, including tail padding.
    #[must_use]
    pub fn size(&self, abi: Abi) -> usize {
        let end = match (self.offsets(abi).last(), self.fields.last()) {
            (Some(offset), Some(field)) => offset + field.kind.size(abi),
            _ => 0,
        };
        align_up(end, self.align(abi))
    }

    /// Whether values of this record must be converted field by field when
    /// crossing from `foreign` to `native`. Nested records are checked too.
    #[must_use]
    pub fn needs_conversion_between(&self, native: Abi, foreign: Abi) -> bool {
        if self.offsets(native) != self.offsets(foreign) || self.size(native) != self.size(foreign) {
            return true;
        }
        self.fields.iter().any(|field| match field.kind {
            ValueKind::Record(nested) => nested.needs_conversion_between(native, foreign),
            _ => false,
        })
    }

    /// Whether the record needs conversion at either width.
    #[must_use]
    pub fn needs_conversion(&self) -> bool {
        self.needs_conversion_between(Abi::Unix32, Abi::Win32)
            || self.needs_conversion_between(Abi::Unix64, Abi::Win64)
    }

    /// Whether the record needs conversion at the width of the current target.
    #[must_use]
    pub fn needs_conversion_on_host(&self) -> bool {
        self.needs_conversion_between(Abi::HOST, Abi::HOST.peer())
    }
}
