//! Interface descriptors
//!
//! One [`InterfaceDescriptor`] exists per (interface, version) pair. It is
//! emitted as a `static` by `#[foreign_interface]` and never mutated. The
//! vtable registry validates it once, when the table is built.

use std::collections::HashSet;
use std::fmt;

use crate::error::{BridgeError, Result};
use crate::layout::{Abi, ValueKind};

/// Identity of a foreign vtable: interface name plus version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceKey {
    pub interface: &'static str,
    pub version: &'static str,
}

impl InterfaceKey {
    pub const fn new(interface: &'static str, version: &'static str) -> Self {
        Self { interface, version }
    }
}

impl fmt::Display for InterfaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.interface, self.version)
    }
}

/// A declared method parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: &'static str,
    pub kind: ValueKind,
}

/// A method occupying one vtable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// SDK spelling of the method name
    pub name: &'static str,
    /// Vtable index
    pub slot: usize,
    pub ret: ValueKind,
    pub params: &'static [ParamDescriptor],
    /// Aggregate result written through a caller-supplied pointer
    pub hidden_return: bool,
}

impl MethodDescriptor {
    /// Bytes of stack arguments the callee pops under the 32-bit foreign
    /// thiscall convention (the `DEFINE_THISCALL_WRAPPER` size).
    #[must_use]
    pub fn stack_bytes(&self) -> usize {
        let this = 4;
        let hidden = if self.hidden_return { 4 } else { 0 };
        let params: usize = self
            .params
            .iter()
            .map(|param| param.kind.size(Abi::Win32).div_ceil(4) * 4)
            .sum();
        this + hidden + params
    }
}

/// Method table of one interface version.
#[derive(Debug, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub interface: &'static str,
    pub version: &'static str,
    /// Number of vtable slots, reserved slots included
    pub slot_count: usize,
    /// Methods in slot order
    pub methods: &'static [MethodDescriptor],
}

impl InterfaceDescriptor {
    #[must_use]
    pub const fn key(&self) -> InterfaceKey {
        InterfaceKey::new(self.interface, self.version)
    }

    /// Find a method by SDK name.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// Find the method occupying `slot`, `None` for reserved slots.
    #[must_use]
    pub fn method_at(&self, slot: usize) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|method| method.slot == slot)
    }

    /// Slots that have no method behind them.
    #[must_use]
    pub fn reserved_slots(&self) -> Vec<usize> {
        (0..self.slot_count)
            .filter(|slot| self.method_at(*slot).is_none())
            .collect()
    }

    /// Check slot ordering and naming.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| BridgeError::Descriptor {
            key: self.key(),
            reason,
        };

        let mut names = HashSet::new();
        let mut next_slot = 0;
        for method in self.methods {
            if method.name.is_empty() {
                return Err(fail(format!("method at slot {} has no name", method.slot)));
            }
            if !names.insert(method.name) {
                return Err(fail(format!("method '{}' declared twice", method.name)));
            }
            if method.slot < next_slot {
                return Err(fail(format!(
                    "method '{}' at slot {} is out of order (next available: {})",
                    method.name, method.slot, next_slot
                )));
            }
            if method.slot >= self.slot_count {
                return Err(fail(format!(
                    "method '{}' at slot {} exceeds slot count {}",
                    method.name, method.slot, self.slot_count
                )));
            }
            if method.hidden_return && !method.ret.is_record() {
                return Err(fail(format!(
                    "method '{}' returns through a hidden pointer but its result is not a record",
                    method.name
                )));
            }
            if method.ret.is_record() && !method.hidden_return {
                return Err(fail(format!(
                    "method '{}' returns a record by value, records are returned through a hidden pointer",
                    method.name
                )));
            }
            next_slot = method.slot + 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{FieldLayout, StructLayout};

    static ID: StructLayout = StructLayout::new("CSteamID", &[FieldLayout::new("raw", ValueKind::U64)]);

    static SAMPLE: InterfaceDescriptor = InterfaceDescriptor {
        interface: "ISample",
        version: "SAMPLE_VERSION001",
        slot_count: 4,
        methods: &[
            MethodDescriptor {
                name: "Count",
                slot: 0,
                ret: ValueKind::U32,
                params: &[],
                hidden_return: false,
            },
            MethodDescriptor {
                name: "Owner",
                slot: 1,
                ret: ValueKind::Record(&ID),
                params: &[ParamDescriptor {
                    name: "session",
                    kind: ValueKind::U32,
                }],
                hidden_return: true,
            },
            MethodDescriptor {
                name: "Invite",
                slot: 3,
                ret: ValueKind::Bool,
                params: &[ParamDescriptor {
                    name: "friend",
                    kind: ValueKind::Record(&ID),
                }],
                hidden_return: false,
            },
        ],
    };

    #[test]
    fn test_key_display() {
        assert_eq!(SAMPLE.key().to_string(), "ISample/SAMPLE_VERSION001");
    }

    #[test]
    fn test_lookup_by_name_and_slot() {
        assert_eq!(SAMPLE.method("Owner").map(|m| m.slot), Some(1));
        assert_eq!(SAMPLE.method_at(3).map(|m| m.name), Some("Invite"));
        assert!(SAMPLE.method("Missing").is_none());
        assert!(SAMPLE.method_at(2).is_none());
    }

    #[test]
    fn test_reserved_slots() {
        assert_eq!(SAMPLE.reserved_slots(), vec![2]);
    }

    #[test]
    fn test_stack_bytes() {
        assert_eq!(SAMPLE.methods[0].stack_bytes(), 4);
        // this + hidden return pointer + u32
        assert_eq!(SAMPLE.methods[1].stack_bytes(), 12);
        // this + 8-byte record by value
        assert_eq!(SAMPLE.methods[2].stack_bytes(), 12);
    }

    #[test]
    fn test_small_params_round_up() {
        static PARAMS: [ParamDescriptor; 2] = [
            ParamDescriptor {
                name: "flag",
                kind: ValueKind::Bool,
            },
            ParamDescriptor {
                name: "short",
                kind: ValueKind::U16,
            },
        ];
        let method = MethodDescriptor {
            name: "Small",
            slot: 0,
            ret: ValueKind::Void,
            params: &PARAMS,
            hidden_return: false,
        };
        assert_eq!(method.stack_bytes(), 12);
    }

    #[test]
    fn test_valid_descriptor() {
        assert_eq!(SAMPLE.validate(), Ok(()));
    }

    #[test]
    fn test_out_of_order_slots_rejected() {
        static BAD: InterfaceDescriptor = InterfaceDescriptor {
            interface: "IBad",
            version: "BAD001",
            slot_count: 2,
            methods: &[
                MethodDescriptor {
                    name: "B",
                    slot: 1,
                    ret: ValueKind::Void,
                    params: &[],
                    hidden_return: false,
                },
                MethodDescriptor {
                    name: "A",
                    slot: 0,
                    ret: ValueKind::Void,
                    params: &[],
                    hidden_return: false,
                },
            ],
        };
        let err = BAD.validate().unwrap_err();
        assert!(err.to_string().contains("out of order"));
    }

    #[test]
    fn test_slot_beyond_count_rejected() {
        static BAD: InterfaceDescriptor = InterfaceDescriptor {
            interface: "IBad",
            version: "BAD002",
            slot_count: 1,
            methods: &[MethodDescriptor {
                name: "A",
                slot: 1,
                ret: ValueKind::Void,
                params: &[],
                hidden_return: false,
            }],
        };
        assert!(matches!(BAD.validate(), Err(BridgeError::Descriptor { .. })));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        static BAD: InterfaceDescriptor = InterfaceDescriptor {
            interface: "IBad",
            version: "BAD003",
            slot_count: 2,
            methods: &[
                MethodDescriptor {
                    name: "A",
                    slot: 0,
                    ret: ValueKind::Void,
                    params: &[],
                    hidden_return: false,
                },
                MethodDescriptor {
                    name: "A",
                    slot: 1,
                    ret: ValueKind::Void,
                    params: &[],
                    hidden_return: false,
                },
            ],
        };
        assert!(BAD.validate().unwrap_err().to_string().contains("declared twice"));
    }

    #[test]
    fn test_hidden_return_requires_record() {
        static BAD: InterfaceDescriptor = InterfaceDescriptor {
            interface: "IBad",
            version: "BAD004",
            slot_count: 1,
            methods: &[MethodDescriptor {
                name: "A",
                slot: 0,
                ret: ValueKind::U32,
                params: &[],
                hidden_return: true,
            }],
        };
        assert!(BAD.validate().is_err());
    }

    #[test]
    fn test_record_return_requires_hidden_pointer() {
        static BAD: InterfaceDescriptor = InterfaceDescriptor {
            interface: "IBad",
            version: "BAD005",
            slot_count: 1,
            methods: &[MethodDescriptor {
                name: "Owner",
                slot: 0,
                ret: ValueKind::Record(&ID),
                params: &[],
                hidden_return: false,
            }],
        };
        let err = BAD.validate().unwrap_err();
        assert!(err.to_string().contains("returns a record by value"));
        assert!(matches!(err, BridgeError::Descriptor { key, .. } if key.version == "BAD005"));
    }
}
