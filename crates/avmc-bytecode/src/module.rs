//! Serialized module container

use serde::Serialize;
use std::io::{Read, Write};

use crate::buffer::ByteBuffer;
use crate::class::{ClassInfo, InstanceInfo, ScriptInfo};
use crate::constant::{ConstantPool, MultinameEntry, PoolTable};
use crate::error::{BytecodeError, Result};
use crate::method::{MethodBody, MethodInfo};
use crate::operand::MethodIndex;
use crate::reader::AbcReader;
use crate::traits::Metadata;
use crate::{ABC_MAJOR_VERSION, ABC_MINOR_VERSION};

/// A complete bytecode module
#[derive(Debug, Clone, Serialize)]
pub struct AbcModule {
    /// Minor format version
    pub minor_version: u16,
    /// Major format version
    pub major_version: u16,
    /// Constant pool shared by every record
    pub constants: ConstantPool,
    /// Method signatures
    pub methods: Vec<MethodInfo>,
    /// Metadata entries
    pub metadata: Vec<Metadata>,
    /// Instance records, parallel to `classes`
    pub instances: Vec<InstanceInfo>,
    /// Class records, parallel to `instances`
    pub classes: Vec<ClassInfo>,
    /// Scripts
    pub scripts: Vec<ScriptInfo>,
    /// Method bodies
    pub bodies: Vec<MethodBody>,
}

impl Default for AbcModule {
    fn default() -> Self {
        Self::new()
    }
}

impl AbcModule {
    /// Create an empty module with the default version
    pub fn new() -> Self {
        Self {
            minor_version: ABC_MINOR_VERSION,
            major_version: ABC_MAJOR_VERSION,
            constants: ConstantPool::new(),
            methods: Vec::new(),
            metadata: Vec::new(),
            instances: Vec::new(),
            classes: Vec::new(),
            scripts: Vec::new(),
            bodies: Vec::new(),
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let mut out = ByteBuffer::with_capacity(1024);
        out.write_u16(self.minor_version);
        out.write_u16(self.major_version);
        self.write_pool(&mut out)?;

        out.write_count("method count", self.methods.len())?;
        for method in &self.methods {
            method.write(&mut out)?;
        }
        out.write_count("metadata count", self.metadata.len())?;
        for meta in &self.metadata {
            meta.write(&mut out)?;
        }
        out.write_count("class count", self.classes.len())?;
        for instance in &self.instances {
            instance.write(&mut out)?;
        }
        for class in &self.classes {
            class.write(&mut out)?;
        }
        out.write_count("script count", self.scripts.len())?;
        for script in &self.scripts {
            script.write(&mut out)?;
        }
        out.write_count("method body count", self.bodies.len())?;
        for body in &self.bodies {
            body.write(&mut out)?;
        }
        Ok(out.into_bytes())
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        AbcReader::new(bytes).read_module()
    }

    /// Write module to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let bytes = self.to_bytes()?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Read module from a reader
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Render the module as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            BytecodeError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e.to_string(),
            ))
        })
    }

    /// Body of `method`, if it has one
    pub fn body_of(&self, method: MethodIndex) -> Option<&MethodBody> {
        self.bodies.iter().find(|b| b.method == method)
    }

    /// Debug name of `method`
    pub fn method_name(&self, method: MethodIndex) -> &str {
        self.methods
            .get(method.0 as usize)
            .and_then(|m| self.constants.get_string(m.name))
            .unwrap_or("")
    }

    /// Check cross-table references
    pub fn validate(&self) -> Result<()> {
        if self.classes.len() != self.instances.len() {
            return Err(BytecodeError::ClassCountMismatch {
                classes: self.classes.len(),
                instances: self.instances.len(),
            });
        }
        let method_count = self.methods.len();
        let check_method = |index: MethodIndex| {
            if (index.0 as usize) < method_count {
                Ok(())
            } else {
                Err(BytecodeError::InvalidIndex {
                    table: "method",
                    index: index.0,
                })
            }
        };
        for body in &self.bodies {
            check_method(body.method)?;
        }
        for instance in &self.instances {
            check_method(instance.iinit)?;
        }
        for class in &self.classes {
            check_method(class.cinit)?;
        }
        for script in &self.scripts {
            check_method(script.init)?;
        }
        let string_count = self.constants.strings.len() as u32;
        for method in &self.methods {
            if method.name.0 > string_count {
                return Err(BytecodeError::InvalidIndex {
                    table: "string",
                    index: method.name.0,
                });
            }
        }
        Ok(())
    }

    fn write_pool(&self, out: &mut ByteBuffer) -> Result<()> {
        let pool = &self.constants;
        write_table(out, "int pool", &pool.ints, |out, v| {
            out.write_s32(*v);
            Ok(())
        })?;
        write_table(out, "uint pool", &pool.uints, |out, v| {
            out.write_u32(*v);
            Ok(())
        })?;
        write_table(out, "double pool", &pool.doubles, |out, v| {
            out.write_d64(v.value());
            Ok(())
        })?;
        write_table(out, "string pool", &pool.strings, |out, v| {
            out.write_count("string length", v.len())?;
            out.write_bytes(v.as_bytes());
            Ok(())
        })?;
        write_table(out, "namespace pool", &pool.namespaces, |out, ns| {
            out.write_u8(ns.kind.to_byte());
            out.write_u30(ns.name.0)
        })?;
        write_table(out, "namespace set pool", &pool.ns_sets, |out, set| {
            out.write_count("namespace set size", set.0.len())?;
            for ns in &set.0 {
                out.write_u30(ns.0)?;
            }
            Ok(())
        })?;
        write_table(out, "multiname pool", &pool.multinames, write_multiname)
    }
}

fn write_table<T: Eq + std::hash::Hash + Clone>(
    out: &mut ByteBuffer,
    what: &'static str,
    table: &PoolTable<T>,
    mut write: impl FnMut(&mut ByteBuffer, &T) -> Result<()>,
) -> Result<()> {
    out.write_count(what, table.declared_count())?;
    for value in table.iter() {
        write(out, value)?;
    }
    Ok(())
}

fn write_multiname(out: &mut ByteBuffer, entry: &MultinameEntry) -> Result<()> {
    out.write_u8(entry.kind_byte());
    match entry {
        MultinameEntry::QName { ns, name, .. } => {
            out.write_u30(ns.0)?;
            out.write_u30(name.0)
        }
        MultinameEntry::RtqName { name, .. } => out.write_u30(name.0),
        MultinameEntry::RtqNameL { .. } => Ok(()),
        MultinameEntry::Multiname { name, ns_set, .. } => {
            out.write_u30(name.0)?;
            out.write_u30(ns_set.0)
        }
        MultinameEntry::MultinameL { ns_set, .. } => out.write_u30(ns_set.0),
        MultinameEntry::TypeName { base, params } => {
            out.write_u30(base.0)?;
            out.write_count("type parameter count", params.len())?;
            for param in params {
                out.write_u30(param.0)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::{Multiname, Namespace};
    use crate::method::DefaultValue;
    use crate::traits::{Trait, TraitData};

    fn sample_module() -> AbcModule {
        let mut module = AbcModule::new();
        let name = module.constants.string("main");
        module.constants.int(100_000);
        module.constants.double(1.5);
        module
            .constants
            .multiname(&Multiname::late(vec![Namespace::public()]));
        let x = module.constants.multiname(&Multiname::public("x"));
        module.methods.push(MethodInfo::builder().name(name).build());
        module.scripts.push(ScriptInfo {
            init: MethodIndex(0),
            traits: vec![Trait::new(
                x,
                TraitData::Slot {
                    slot_id: 1,
                    type_name: Default::default(),
                    value: DefaultValue::NONE,
                },
            )],
        });
        module.bodies.push(MethodBody {
            method: MethodIndex(0),
            local_count: 1,
            code: vec![0x47],
            ..Default::default()
        });
        module
    }

    #[test]
    fn test_module_roundtrip() {
        let module = sample_module();
        let bytes = module.to_bytes().unwrap();
        assert_eq!(&bytes[..4], &[16, 0, 46, 0]);

        let restored = AbcModule::from_bytes(&bytes).unwrap();
        assert_eq!(restored.methods, module.methods);
        assert_eq!(restored.scripts, module.scripts);
        assert_eq!(restored.bodies, module.bodies);
        assert_eq!(restored.constants.strings.len(), module.constants.strings.len());
        assert_eq!(restored.constants.get_int(1.into()), Some(100_000));
        assert_eq!(restored.method_name(MethodIndex(0)), "main");
        assert_eq!(restored.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_empty_module_layout() {
        let bytes = AbcModule::new().to_bytes().unwrap();
        // version, seven empty pools, five empty tables
        assert_eq!(bytes, vec![16, 0, 46, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_class_mismatch_rejected() {
        let mut module = AbcModule::new();
        module.classes.push(ClassInfo::default());
        assert!(matches!(
            module.to_bytes(),
            Err(BytecodeError::ClassCountMismatch { classes: 1, instances: 0 })
        ));
    }

    #[test]
    fn test_dangling_body_rejected() {
        let mut module = AbcModule::new();
        module.bodies.push(MethodBody::default());
        assert!(matches!(
            module.to_bytes(),
            Err(BytecodeError::InvalidIndex { table: "method", .. })
        ));
    }

    #[test]
    fn test_json_output() {
        let json = sample_module().to_json().unwrap();
        assert!(json.contains("\"major_version\": 46"));
        assert!(json.contains("\"main\""));
    }
}
