//! Trait and descriptor builder
//!
//! Turns the front end's resolved view of a class, script or activation
//! scope into trait records. Names are walked in four groups (slots,
//! methods, getters, setters). Several qualified names bound to the same
//! member collapse into one trait that keeps the last namespace seen.

use tracing::debug;

use avmc_bytecode::{
    ClassIndex, DefaultValue, MetadataIndex, MethodIndex, Multiname, MultinameIndex, Namespace,
    Trait, TraitAttributes, TraitData, ValueKind,
};

use crate::assembler::ModuleAssembler;
use crate::error::{EmitError, EmitResult};

/// Literal initial value of a slot or optional parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    /// `true` / `false`
    Bool(bool),
    /// String literal
    String(String),
    /// Signed integer
    Int(i32),
    /// Unsigned integer
    Uint(u32),
    /// Number
    Double(f64),
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// Namespace constant
    Namespace(Namespace),
    /// Anything else; the text names the construct for diagnostics
    Unsupported(String),
}

/// Metadata attached to a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataDescriptor {
    /// Tag name
    pub name: String,
    /// Key/value pairs; a missing key is a bare value
    pub items: Vec<(Option<String>, String)>,
}

/// What a slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// `var`
    Var,
    /// `const`
    Const,
    /// Class binding
    Class(ClassIndex),
    /// Function closure binding
    Function(MethodIndex),
}

/// One slot of a scope
#[derive(Debug, Clone, PartialEq)]
pub struct SlotDescriptor {
    /// Slot kind
    pub kind: SlotKind,
    /// Slot id (0 lets the engine assign one)
    pub id: u32,
    /// Declared type; `None` is `*`
    pub type_name: Option<Multiname>,
    /// Literal initial value
    pub initializer: Option<Initializer>,
    /// Attached metadata
    pub metadata: Vec<MetadataDescriptor>,
}

impl SlotDescriptor {
    /// Untyped `var` slot with engine-assigned id
    pub fn var() -> Self {
        Self {
            kind: SlotKind::Var,
            id: 0,
            type_name: None,
            initializer: None,
            metadata: Vec::new(),
        }
    }
}

/// One method, getter or setter of a scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Method record
    pub method: MethodIndex,
    /// Dispatch id (0 for late binding)
    pub disp_id: u32,
    /// Cannot be overridden
    pub is_final: bool,
    /// Overrides an inherited member
    pub is_override: bool,
    /// Attached metadata
    pub metadata: Vec<MetadataDescriptor>,
}

impl MethodDescriptor {
    /// Late-bound method
    pub fn new(method: MethodIndex) -> Self {
        Self {
            method,
            disp_id: 0,
            is_final: false,
            is_override: false,
            metadata: Vec::new(),
        }
    }
}

/// A qualified name bound to a slot or method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    /// Local name
    pub name: String,
    /// Qualifying namespace
    pub namespace: Namespace,
    /// Index into the slot or method list the name belongs to
    pub target: usize,
    /// Declared on an ancestor
    pub inherited: bool,
    /// Qualified by an interface namespace
    pub interface_qualified: bool,
}

impl NameEntry {
    /// Own, non-interface name
    pub fn new(name: impl Into<String>, namespace: Namespace, target: usize) -> Self {
        Self {
            name: name.into(),
            namespace,
            target,
            inherited: false,
            interface_qualified: false,
        }
    }
}

/// Resolved member table of a class, instance, script or activation scope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectDescriptor {
    /// Slots, referenced by `slot_names`
    pub slots: Vec<SlotDescriptor>,
    /// Methods and accessors, referenced by the other name groups
    pub methods: Vec<MethodDescriptor>,
    /// Names bound to slots
    pub slot_names: Vec<NameEntry>,
    /// Names bound to methods
    pub method_names: Vec<NameEntry>,
    /// Names bound to getters
    pub getter_names: Vec<NameEntry>,
    /// Names bound to setters
    pub setter_names: Vec<NameEntry>,
    /// Scope belongs to an interface definition
    pub is_interface: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Slot,
    Method,
    Getter,
    Setter,
}

impl ModuleAssembler {
    /// Build the trait records for `scope`
    pub fn build_traits(&mut self, scope: &ObjectDescriptor) -> EmitResult<Vec<Trait>> {
        let mut traits = Vec::new();
        let groups = [
            (Group::Slot, &scope.slot_names),
            (Group::Method, &scope.method_names),
            (Group::Getter, &scope.getter_names),
            (Group::Setter, &scope.setter_names),
        ];
        for (group, names) in groups {
            for (entry, namespace) in merge_aliases(names, scope.is_interface) {
                let name = self.pool.qname(namespace, &entry.name);
                traits.push(self.build_trait(scope, group, entry.target, name)?);
            }
        }
        Ok(traits)
    }

    fn build_trait(
        &mut self,
        scope: &ObjectDescriptor,
        group: Group,
        target: usize,
        name: MultinameIndex,
    ) -> EmitResult<Trait> {
        if group == Group::Slot {
            let slot = scope.slots.get(target).ok_or_else(|| {
                EmitError::internal(format!("name resolves to missing slot {target}"))
            })?;
            let data = match slot.kind {
                SlotKind::Var | SlotKind::Const => {
                    let type_name = slot
                        .type_name
                        .as_ref()
                        .map_or(MultinameIndex::NONE, |t| self.pool.multiname(t));
                    let value = match &slot.initializer {
                        Some(init) => self.slot_default(init),
                        None => DefaultValue::NONE,
                    };
                    if slot.kind == SlotKind::Const {
                        TraitData::Const {
                            slot_id: slot.id,
                            type_name,
                            value,
                        }
                    } else {
                        TraitData::Slot {
                            slot_id: slot.id,
                            type_name,
                            value,
                        }
                    }
                }
                SlotKind::Class(class) => TraitData::Class {
                    slot_id: slot.id,
                    class,
                },
                SlotKind::Function(function) => TraitData::Function {
                    slot_id: slot.id,
                    function,
                },
            };
            let mut t = Trait::new(name, data);
            t.metadata = self.metadata_indices(&slot.metadata);
            return Ok(t);
        }

        let method = scope.methods.get(target).ok_or_else(|| {
            EmitError::internal(format!("name resolves to missing method {target}"))
        })?;
        let (disp_id, index) = (method.disp_id, method.method);
        let data = match group {
            Group::Getter => TraitData::Getter {
                disp_id,
                method: index,
            },
            Group::Setter => TraitData::Setter {
                disp_id,
                method: index,
            },
            _ => TraitData::Method {
                disp_id,
                method: index,
            },
        };
        let mut t = Trait::new(name, data);
        t.attributes.set(TraitAttributes::FINAL, method.is_final);
        t.attributes.set(TraitAttributes::OVERRIDE, method.is_override);
        t.metadata = self.metadata_indices(&method.metadata);
        Ok(t)
    }

    fn metadata_indices(&mut self, metadata: &[MetadataDescriptor]) -> Vec<MetadataIndex> {
        metadata
            .iter()
            .map(|m| self.add_metadata(&m.name, &m.items))
            .collect()
    }

    /// Default for a slot; unsupported literals become "no default"
    fn slot_default(&mut self, init: &Initializer) -> DefaultValue {
        self.default_value(init).unwrap_or_else(|| {
            debug!(initializer = ?init, "slot initializer has no constant form");
            DefaultValue::NONE
        })
    }

    /// Default for an optional parameter; unsupported literals are an error
    pub fn parameter_default(&mut self, init: &Initializer) -> EmitResult<DefaultValue> {
        self.default_value(init).ok_or_else(|| {
            EmitError::internal(format!("unsupported optional parameter default {init:?}"))
        })
    }

    /// Pool index and kind for a literal
    pub fn default_value(&mut self, init: &Initializer) -> Option<DefaultValue> {
        let value = match init {
            Initializer::Bool(b) => DefaultValue::bool(*b),
            Initializer::String(s) => DefaultValue::new(self.pool.string(s).0, ValueKind::Utf8),
            Initializer::Int(i) => DefaultValue::new(self.pool.int(*i).0, ValueKind::Int),
            Initializer::Uint(u) => DefaultValue::new(self.pool.uint(*u).0, ValueKind::Uint),
            Initializer::Double(d) => DefaultValue::new(self.pool.double(*d).0, ValueKind::Double),
            Initializer::Null => DefaultValue::null(),
            Initializer::Undefined => DefaultValue::NONE,
            Initializer::Namespace(ns) => DefaultValue::new(
                self.pool.namespace(ns).0,
                ValueKind::for_namespace(ns.kind),
            ),
            Initializer::Unsupported(_) => return None,
        };
        Some(value)
    }
}

/// Filter a name group and merge names bound to the same target
///
/// Order follows each target's first retained name; the namespace is the
/// last one seen for that target.
fn merge_aliases(names: &[NameEntry], is_interface: bool) -> Vec<(&NameEntry, &Namespace)> {
    let mut merged: Vec<(&NameEntry, &Namespace)> = Vec::new();
    for entry in names {
        if entry.inherited || (entry.interface_qualified && !is_interface) {
            continue;
        }
        match merged.iter_mut().find(|(e, _)| e.target == entry.target) {
            // TODO: confirm aliased members should keep only their last namespace
            Some(slot) => slot.1 = &entry.namespace,
            None => merged.push((entry, &entry.namespace)),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use avmc_bytecode::constant::MultinameEntry;
    use avmc_bytecode::NamespaceKind;

    fn scope_with_slot(initializer: Option<Initializer>) -> ObjectDescriptor {
        ObjectDescriptor {
            slots: vec![SlotDescriptor {
                initializer,
                id: 1,
                ..SlotDescriptor::var()
            }],
            slot_names: vec![NameEntry::new("x", Namespace::public(), 0)],
            ..Default::default()
        }
    }

    #[test]
    fn test_groups_in_order() {
        let mut asm = ModuleAssembler::new();
        let m = asm.method_index("m");
        let scope = ObjectDescriptor {
            slots: vec![SlotDescriptor::var()],
            methods: vec![MethodDescriptor::new(m), MethodDescriptor::new(m)],
            slot_names: vec![NameEntry::new("s", Namespace::public(), 0)],
            setter_names: vec![NameEntry::new("p", Namespace::public(), 1)],
            getter_names: vec![NameEntry::new("p", Namespace::public(), 0)],
            method_names: vec![NameEntry::new("f", Namespace::public(), 0)],
            is_interface: false,
        };
        let traits = asm.build_traits(&scope).unwrap();
        let kinds: Vec<_> = traits.iter().map(|t| t.data.kind() as u8).collect();
        assert_eq!(kinds, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_inherited_and_interface_names_skipped() {
        let mut asm = ModuleAssembler::new();
        let mut inherited = NameEntry::new("a", Namespace::public(), 0);
        inherited.inherited = true;
        let mut iface = NameEntry::new("b", Namespace::public(), 0);
        iface.interface_qualified = true;
        let mut scope = ObjectDescriptor {
            slots: vec![SlotDescriptor::var()],
            slot_names: vec![inherited, iface],
            ..Default::default()
        };
        assert!(asm.build_traits(&scope).unwrap().is_empty());

        scope.is_interface = true;
        assert_eq!(asm.build_traits(&scope).unwrap().len(), 1);
    }

    #[test]
    fn test_aliases_merge_with_last_namespace() {
        let mut asm = ModuleAssembler::new();
        let scope = ObjectDescriptor {
            slots: vec![SlotDescriptor::var()],
            slot_names: vec![
                NameEntry::new("x", Namespace::public(), 0),
                NameEntry::new("x", Namespace::internal("pkg"), 0),
            ],
            ..Default::default()
        };
        let traits = asm.build_traits(&scope).unwrap();
        assert_eq!(traits.len(), 1);
        let Some(MultinameEntry::QName { ns, .. }) = asm.pool().get_multiname(traits[0].name) else {
            panic!("expected a qname");
        };
        let ns = asm.pool().get_namespace(*ns).unwrap();
        assert_eq!(ns.kind, NamespaceKind::PackageInternal);
    }

    #[test]
    fn test_missing_target_is_internal() {
        let mut asm = ModuleAssembler::new();
        let scope = ObjectDescriptor {
            slot_names: vec![NameEntry::new("x", Namespace::public(), 3)],
            ..Default::default()
        };
        assert!(matches!(
            asm.build_traits(&scope),
            Err(EmitError::Internal(_))
        ));
    }

    #[test]
    fn test_slot_defaults() {
        let mut asm = ModuleAssembler::new();
        let traits = asm
            .build_traits(&scope_with_slot(Some(Initializer::Int(7))))
            .unwrap();
        let TraitData::Slot { value, .. } = traits[0].data else {
            panic!("expected a slot");
        };
        assert_eq!(value.kind, ValueKind::Int);
        assert_eq!(asm.pool().get_int(avmc_bytecode::IntIndex(value.index)), Some(7));

        let traits = asm
            .build_traits(&scope_with_slot(Some(Initializer::Unsupported("regex".into()))))
            .unwrap();
        let TraitData::Slot { value, .. } = traits[0].data else {
            panic!("expected a slot");
        };
        assert!(value.is_none());
    }

    #[test]
    fn test_unsupported_parameter_default_is_error() {
        let mut asm = ModuleAssembler::new();
        assert!(asm.parameter_default(&Initializer::Bool(true)).is_ok());
        assert!(
            asm.parameter_default(&Initializer::Unsupported("new Date()".into()))
                .is_err()
        );
    }

    #[test]
    fn test_method_attributes_and_metadata() {
        let mut asm = ModuleAssembler::new();
        let m = asm.method_index("m");
        let mut method = MethodDescriptor::new(m);
        method.is_override = true;
        method.disp_id = 3;
        method.metadata = vec![MetadataDescriptor {
            name: "Inline".into(),
            items: Vec::new(),
        }];
        let scope = ObjectDescriptor {
            methods: vec![method],
            method_names: vec![NameEntry::new("m", Namespace::public(), 0)],
            ..Default::default()
        };
        let traits = asm.build_traits(&scope).unwrap();
        assert!(traits[0].attributes.contains(TraitAttributes::OVERRIDE));
        assert!(!traits[0].attributes.contains(TraitAttributes::FINAL));
        assert_eq!(traits[0].metadata, vec![MetadataIndex(0)]);
        assert_eq!(traits[0].kind_byte(), 0x61);
    }
}
