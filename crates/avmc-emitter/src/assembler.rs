//! Module assembler
//!
//! Owns the constant pool and every per-module table. Methods and classes
//! are created lazily the first time their name is referenced so forward
//! references and recursion resolve to the same record; each is filled in
//! exactly once when its definition finishes.

use rustc_hash::FxHashMap;
use tracing::debug;

use avmc_bytecode::{
    AbcModule, ClassIndex, ClassInfo, ConstantPool, InstanceInfo, Metadata, MetadataIndex,
    MethodBody, MethodIndex, MethodInfo, Multiname, ScriptInfo, StringIndex,
};

use crate::config::EmitterConfig;
use crate::error::{EmitError, EmitResult};

/// Per-module tables under construction
#[derive(Debug, Default)]
pub struct ModuleAssembler {
    pub(crate) pool: ConstantPool,
    methods: Vec<Option<MethodInfo>>,
    method_names: Vec<String>,
    method_index: FxHashMap<String, MethodIndex>,
    bodies: Vec<MethodBody>,
    instances: Vec<InstanceInfo>,
    classes: Vec<ClassInfo>,
    class_defined: Vec<bool>,
    class_index: FxHashMap<Multiname, ClassIndex>,
    scripts: Vec<ScriptInfo>,
    metadata: Vec<Metadata>,
    metadata_index: FxHashMap<Metadata, MetadataIndex>,
}

impl ModuleAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Constant pool
    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    /// Mutable constant pool
    pub fn pool_mut(&mut self) -> &mut ConstantPool {
        &mut self.pool
    }

    /// Index of the method named `name`, creating an empty record on first use
    pub fn method_index(&mut self, name: &str) -> MethodIndex {
        if let Some(&index) = self.method_index.get(name) {
            return index;
        }
        let index = MethodIndex(self.methods.len() as u32);
        self.methods.push(None);
        self.method_names.push(name.to_string());
        self.method_index.insert(name.to_string(), index);
        index
    }

    /// Fill in the record for `index`; each method is finalized once
    pub fn define_method(
        &mut self,
        index: MethodIndex,
        info: MethodInfo,
        body: Option<MethodBody>,
    ) -> EmitResult<()> {
        let slot = self
            .methods
            .get_mut(index.0 as usize)
            .ok_or_else(|| EmitError::internal(format!("method #{} does not exist", index.0)))?;
        if slot.is_some() {
            return Err(EmitError::internal(format!(
                "method `{}` finished twice",
                self.method_names[index.0 as usize]
            )));
        }
        *slot = Some(info);
        if let Some(body) = body {
            self.bodies.push(body);
        }
        Ok(())
    }

    /// Number of method records, finished or not
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Index of the class named `name`, creating its class/instance pair on first use
    pub fn class_index(&mut self, name: &Multiname) -> EmitResult<ClassIndex> {
        if let Some(&index) = self.class_index.get(name) {
            return Ok(index);
        }
        let index = ClassIndex(self.classes.len() as u32);
        let name_index = self.pool.multiname(name);
        self.instances.push(InstanceInfo {
            name: name_index,
            ..Default::default()
        });
        self.classes.push(ClassInfo::default());
        self.class_defined.push(false);
        self.class_index.insert(name.clone(), index);
        self.check_lock_step()?;
        Ok(index)
    }

    /// Fill in both halves of class `index`
    pub fn define_class(
        &mut self,
        index: ClassIndex,
        instance: InstanceInfo,
        class: ClassInfo,
    ) -> EmitResult<()> {
        let i = index.0 as usize;
        match self.class_defined.get(i) {
            None => {
                return Err(EmitError::internal(format!("class #{i} does not exist")));
            }
            Some(true) => {
                return Err(EmitError::internal(format!("class #{i} finished twice")));
            }
            Some(false) => {}
        }
        self.instances[i] = instance;
        self.classes[i] = class;
        self.class_defined[i] = true;
        Ok(())
    }

    /// Number of class records
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Number of instance records
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    fn check_lock_step(&self) -> EmitResult<()> {
        if self.classes.len() != self.instances.len() {
            return Err(EmitError::internal(format!(
                "class count {} != instance count {}",
                self.classes.len(),
                self.instances.len()
            )));
        }
        Ok(())
    }

    /// Append a script record and return its index
    pub fn add_script(&mut self, script: ScriptInfo) -> usize {
        self.scripts.push(script);
        self.scripts.len() - 1
    }

    /// Number of scripts
    pub fn script_count(&self) -> usize {
        self.scripts.len()
    }

    /// Intern a metadata entry; equal name/key/value lists share one index
    pub fn add_metadata(&mut self, name: &str, items: &[(Option<String>, String)]) -> MetadataIndex {
        let name = self.pool.string(name);
        let items = items
            .iter()
            .map(|(key, value)| {
                let key = key
                    .as_deref()
                    .map_or(StringIndex::NONE, |k| self.pool.string(k));
                (key, self.pool.string(value))
            })
            .collect();
        let entry = Metadata { name, items };
        if let Some(&index) = self.metadata_index.get(&entry) {
            return index;
        }
        let index = MetadataIndex(self.metadata.len() as u32);
        self.metadata.push(entry.clone());
        self.metadata_index.insert(entry, index);
        index
    }

    /// Seal the tables into a module
    pub fn finish(self, config: &EmitterConfig) -> EmitResult<AbcModule> {
        self.check_lock_step()?;
        let mut methods = Vec::with_capacity(self.methods.len());
        for (info, name) in self.methods.into_iter().zip(&self.method_names) {
            match info {
                Some(info) => methods.push(info),
                None => {
                    return Err(EmitError::internal(format!(
                        "method `{name}` referenced but never finished"
                    )));
                }
            }
        }
        if let Some(i) = self.class_defined.iter().position(|&defined| !defined) {
            let name = self.pool.display_multiname(self.instances[i].name);
            return Err(EmitError::internal(format!(
                "class `{name}` referenced but never finished"
            )));
        }
        debug!(
            methods = methods.len(),
            classes = self.classes.len(),
            scripts = self.scripts.len(),
            "module assembled"
        );
        Ok(AbcModule {
            minor_version: config.minor_version,
            major_version: config.major_version,
            constants: self.pool,
            methods,
            metadata: self.metadata,
            instances: self.instances,
            classes: self.classes,
            scripts: self.scripts,
            bodies: self.bodies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avmc_bytecode::Namespace;

    #[test]
    fn test_method_index_is_lazy_and_stable() {
        let mut asm = ModuleAssembler::new();
        let f = asm.method_index("f");
        let g = asm.method_index("g");
        assert_eq!(asm.method_index("f"), f);
        assert_ne!(f, g);
        assert_eq!(asm.method_count(), 2);
    }

    #[test]
    fn test_method_defined_once() {
        let mut asm = ModuleAssembler::new();
        let f = asm.method_index("f");
        asm.define_method(f, MethodInfo::default(), None).unwrap();
        let err = asm.define_method(f, MethodInfo::default(), None).unwrap_err();
        assert!(matches!(err, EmitError::Internal(_)));
    }

    #[test]
    fn test_unfinished_method_fails_finish() {
        let mut asm = ModuleAssembler::new();
        asm.method_index("forward");
        let err = asm.finish(&EmitterConfig::default()).unwrap_err();
        assert!(err.to_string().contains("forward"));
    }

    #[test]
    fn test_class_pairs_stay_in_lock_step() {
        let mut asm = ModuleAssembler::new();
        let a = Multiname::qname(Namespace::package("p"), "A");
        let b = Multiname::public("B");
        let ia = asm.class_index(&a).unwrap();
        asm.class_index(&b).unwrap();
        assert_eq!(asm.class_index(&a).unwrap(), ia);
        assert_eq!(asm.class_count(), 2);
        assert_eq!(asm.instance_count(), 2);
    }

    #[test]
    fn test_metadata_dedup() {
        let mut asm = ModuleAssembler::new();
        let items = vec![(Some("name".to_string()), "x".to_string())];
        let a = asm.add_metadata("Event", &items);
        let b = asm.add_metadata("Event", &items);
        let c = asm.add_metadata("Event", &[(None, "x".to_string())]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
