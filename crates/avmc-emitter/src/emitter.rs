//! Front-end call protocol
//!
//! The front end drives one [`Emitter`] per compilation unit with a
//! depth-first walk: `start_method` / instruction calls / `finish_method`
//! for every function body, `start_class` / `finish_class` for classes and
//! `start_program` / `finish_program` for each script. Methods may nest;
//! an inner method is finished before its enclosing one resumes.

use tracing::debug;

use avmc_bytecode::{
    AbcModule, ClassIndex, ClassInfo, ConstantPool, InstanceFlags, InstanceInfo, MethodBody,
    MethodFlags, MethodIndex, MethodInfo, Multiname, MultinameIndex, Namespace, ScriptInfo,
    StringIndex,
};

use crate::assembler::ModuleAssembler;
use crate::codegen::{ArgumentsMode, MethodState, StartMethod};
use crate::config::EmitterConfig;
use crate::debug::{CoverageMap, DebugState};
use crate::error::{EmitError, EmitResult};
use crate::traits::{Initializer, ObjectDescriptor};

/// Parameters of FinishMethod
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinishMethod {
    /// Declared return type; `None` is `*`
    pub return_type: Option<Multiname>,
    /// One entry per parameter (or empty for all `*`)
    pub param_types: Vec<Option<Multiname>>,
    /// Defaults for the trailing optional parameters
    pub optional: Vec<Initializer>,
    /// Parameter names (or empty)
    pub param_names: Vec<String>,
    /// Implemented by the host; no body is written
    pub is_native: bool,
    /// Interface method; no body is written
    pub is_interface: bool,
    /// Activation-object scope, when the method needs one
    pub activation: Option<ObjectDescriptor>,
}

/// Parameters of FinishClass
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDefinition {
    /// Class name, as passed to `start_class`
    pub name: Multiname,
    /// Base class
    pub super_name: Option<Multiname>,
    /// Implemented interfaces
    pub interfaces: Vec<Multiname>,
    /// Sealed/final/interface/non-nullable flags
    pub flags: InstanceFlags,
    /// Protected namespace
    pub protected_ns: Option<Namespace>,
    /// Instance initializer
    pub iinit: MethodIndex,
    /// Static initializer
    pub cinit: MethodIndex,
    /// Instance members
    pub instance_traits: ObjectDescriptor,
    /// Static members
    pub static_traits: ObjectDescriptor,
}

impl ClassDefinition {
    /// Class with no base, interfaces or members
    pub fn new(name: Multiname, iinit: MethodIndex, cinit: MethodIndex) -> Self {
        Self {
            name,
            super_name: None,
            interfaces: Vec::new(),
            flags: InstanceFlags::empty(),
            protected_ns: None,
            iinit,
            cinit,
            instance_traits: ObjectDescriptor::default(),
            static_traits: ObjectDescriptor::default(),
        }
    }
}

/// Parameters of FinishProgram
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramDefinition {
    /// Script initializer
    pub init: MethodIndex,
    /// Global members
    pub traits: ObjectDescriptor,
}

/// A finished compilation unit
#[derive(Debug, Clone)]
pub struct EmittedModule {
    /// The assembled module
    pub module: AbcModule,
    /// Branch points registered by coverage records
    pub coverage: CoverageMap,
}

impl EmittedModule {
    /// Serialize the module
    pub fn to_bytes(&self) -> EmitResult<Vec<u8>> {
        Ok(self.module.to_bytes()?)
    }
}

/// Code generator for one compilation unit
#[derive(Debug)]
pub struct Emitter {
    pub(crate) config: EmitterConfig,
    pub(crate) assembler: ModuleAssembler,
    /// Open methods, innermost last
    pub(crate) methods: Vec<MethodState>,
    pub(crate) debug: DebugState,
    pub(crate) coverage: CoverageMap,
}

impl Emitter {
    /// Create an emitter
    pub fn new(config: EmitterConfig) -> Self {
        Self {
            config,
            assembler: ModuleAssembler::new(),
            methods: Vec::new(),
            debug: DebugState::default(),
            coverage: CoverageMap::default(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    /// Module tables built so far
    pub fn assembler(&self) -> &ModuleAssembler {
        &self.assembler
    }

    /// Constant pool
    pub fn pool(&self) -> &ConstantPool {
        &self.assembler.pool
    }

    /// Mutable constant pool
    pub fn pool_mut(&mut self) -> &mut ConstantPool {
        &mut self.assembler.pool
    }

    /// Innermost open method
    pub fn current(&self) -> EmitResult<&MethodState> {
        self.methods.last().ok_or(EmitError::NoOpenMethod)
    }

    pub(crate) fn current_mut(&mut self) -> EmitResult<&mut MethodState> {
        self.methods.last_mut().ok_or(EmitError::NoOpenMethod)
    }

    /// Pool and innermost method, borrowed together
    pub(crate) fn split(&mut self) -> EmitResult<(&mut ConstantPool, &mut MethodState)> {
        let method = self.methods.last_mut().ok_or(EmitError::NoOpenMethod)?;
        Ok((&mut self.assembler.pool, method))
    }

    /// Intern a multiname
    pub fn multiname(&mut self, name: &Multiname) -> MultinameIndex {
        self.assembler.pool.multiname(name)
    }

    /// Index of the method named `name`, for forward references
    pub fn method_index(&mut self, name: &str) -> MethodIndex {
        self.assembler.method_index(name)
    }

    /// Open a method body
    pub fn start_method(&mut self, start: StartMethod) -> EmitResult<MethodIndex> {
        let index = self.assembler.method_index(&start.name);
        debug!(method = %start.name, index = index.0, depth = self.methods.len(), "start method");
        self.methods.push(MethodState::new(&start, &self.config));
        self.debug.enter_function();
        Ok(index)
    }

    /// Seal the innermost method and write its records
    pub fn finish_method(&mut self, finish: FinishMethod) -> EmitResult<MethodIndex> {
        let state = self.methods.pop().ok_or(EmitError::NoOpenMethod)?;
        let index = self.assembler.method_index(&state.name);

        if !state.flow.is_empty() || !state.handlers.is_empty() {
            state.ordering_violation("method finished with open control-flow or exception blocks");
        }
        if state.depth.stack != 0 {
            state.ordering_violation(&format!(
                "method finished with stack depth {}",
                state.depth.stack
            ));
        }
        if state.registers.in_use() != 0 {
            state.ordering_violation(&format!(
                "method finished with {} temporaries still allocated",
                state.registers.in_use()
            ));
        }

        let param_count = state.param_count as usize;
        if !finish.param_types.is_empty() && finish.param_types.len() != param_count {
            return Err(EmitError::internal(format!(
                "method `{}` declares {} parameters but {} types",
                state.name,
                param_count,
                finish.param_types.len()
            )));
        }
        if !finish.param_names.is_empty() && finish.param_names.len() != param_count {
            return Err(EmitError::internal(format!(
                "method `{}` declares {} parameters but {} names",
                state.name,
                param_count,
                finish.param_names.len()
            )));
        }
        if finish.optional.len() > param_count {
            return Err(EmitError::internal(format!(
                "method `{}` has more defaults than parameters",
                state.name
            )));
        }

        let info = self.method_info(&state, &finish)?;
        let has_body = !finish.is_native && !finish.is_interface;
        let body = if has_body {
            let traits = match &finish.activation {
                Some(scope) => self.assembler.build_traits(scope)?,
                None => Vec::new(),
            };
            Some(MethodBody {
                method: index,
                max_stack: state.depth.max_stack,
                local_count: state.local_count(),
                init_scope_depth: state.init_scope_depth,
                max_scope_depth: state.depth.max_scope,
                code: state.code.into_bytes(),
                exceptions: state.exceptions,
                traits,
            })
        } else {
            None
        };
        self.assembler.define_method(index, info, body)?;
        self.debug.enter_function();
        debug!(method = %state.name, index = index.0, "finish method");
        Ok(index)
    }

    fn method_info(&mut self, state: &MethodState, finish: &FinishMethod) -> EmitResult<MethodInfo> {
        let pool = &mut self.assembler.pool;
        let mut builder = MethodInfo::builder();
        if finish.param_types.is_empty() {
            for _ in 0..state.param_count {
                builder = builder.param(MultinameIndex::NONE);
            }
        } else {
            for ty in &finish.param_types {
                builder = builder.param(ty.as_ref().map_or(MultinameIndex::NONE, |t| pool.multiname(t)));
            }
        }
        if let Some(ty) = &finish.return_type {
            builder = builder.return_type(pool.multiname(ty));
        }
        let name = state
            .debug_name
            .as_deref()
            .map_or(StringIndex::NONE, |n| pool.string(n));
        builder = builder.name(name);
        for param in &finish.param_names {
            builder = builder.param_name(pool.string(param));
        }

        let mut flags = MethodFlags::empty();
        flags.set(MethodFlags::NEED_ARGUMENTS, state.arguments == ArgumentsMode::Arguments);
        flags.set(MethodFlags::NEED_REST, state.arguments == ArgumentsMode::Rest);
        flags.set(MethodFlags::NEED_ACTIVATION, state.needs_activation);
        flags.set(MethodFlags::NATIVE, finish.is_native);
        flags.set(MethodFlags::SET_DXNS, state.sets_dxns);
        builder = builder.flags(flags);

        for init in &finish.optional {
            builder = builder.optional(self.assembler.parameter_default(init)?);
        }
        Ok(builder.build())
    }

    /// Reserve the class/instance pair for `name`
    pub fn start_class(&mut self, name: &Multiname) -> EmitResult<ClassIndex> {
        let index = self.assembler.class_index(name)?;
        debug!(class = index.0, "start class");
        Ok(index)
    }

    /// Write both halves of a class
    pub fn finish_class(&mut self, def: ClassDefinition) -> EmitResult<ClassIndex> {
        let index = self.assembler.class_index(&def.name)?;
        let name = self.assembler.pool.multiname(&def.name);
        let super_name = def
            .super_name
            .as_ref()
            .map_or(MultinameIndex::NONE, |s| self.assembler.pool.multiname(s));
        let interfaces = def
            .interfaces
            .iter()
            .map(|i| self.assembler.pool.multiname(i))
            .collect();
        let protected_ns = def
            .protected_ns
            .as_ref()
            .map(|ns| self.assembler.pool.namespace(ns));
        let mut flags = def.flags;
        if def.instance_traits.is_interface {
            flags |= InstanceFlags::INTERFACE;
        }

        let instance = InstanceInfo {
            name,
            super_name,
            flags,
            protected_ns,
            interfaces,
            iinit: def.iinit,
            traits: self.assembler.build_traits(&def.instance_traits)?,
        };
        let class = ClassInfo {
            cinit: def.cinit,
            traits: self.assembler.build_traits(&def.static_traits)?,
        };
        self.assembler.define_class(index, instance, class)?;
        debug!(class = index.0, "finish class");
        Ok(index)
    }

    /// Begin a script; returns the index `finish_program` will assign
    pub fn start_program(&mut self) -> usize {
        let index = self.assembler.script_count();
        debug!(script = index, "start program");
        index
    }

    /// Write a script record
    pub fn finish_program(&mut self, def: ProgramDefinition) -> EmitResult<usize> {
        let traits = self.assembler.build_traits(&def.traits)?;
        let index = self.assembler.add_script(ScriptInfo {
            init: def.init,
            traits,
        });
        debug!(script = index, "finish program");
        Ok(index)
    }

    /// Intern a metadata entry
    pub fn add_metadata(
        &mut self,
        name: &str,
        items: &[(Option<String>, String)],
    ) -> avmc_bytecode::MetadataIndex {
        self.assembler.add_metadata(name, items)
    }

    /// Seal the compilation unit
    pub fn finish(self) -> EmitResult<EmittedModule> {
        if let Some(open) = self.methods.last() {
            return Err(EmitError::internal(format!(
                "method `{}` is still open",
                open.name
            )));
        }
        let module = self.assembler.finish(&self.config)?;
        Ok(EmittedModule {
            module,
            coverage: self.coverage,
        })
    }
}
