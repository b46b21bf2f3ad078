//! Native id header
//!
//! Host implementations of `native` methods are looked up by integer id.
//! This module walks a finished module and lists every native method with
//! the class or package that owns it, plus the class and script ids.

use serde::Serialize;
use std::fmt::Write as _;

use crate::constant::MultinameEntry;
use crate::method::MethodFlags;
use crate::module::AbcModule;
use crate::operand::{MethodIndex, MultinameIndex};
use crate::traits::{Trait, TraitData};

/// One `name = id` line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderEntry {
    /// Identifier
    pub name: String,
    /// Integer id
    pub id: u32,
}

/// Ids of native methods, classes and scripts in one module
#[derive(Debug, Clone, Default, Serialize)]
pub struct NativeHeader {
    /// Native methods as `<owner>_<method>`
    pub methods: Vec<HeaderEntry>,
    /// Classes by name
    pub classes: Vec<HeaderEntry>,
    /// Scripts by package name
    pub scripts: Vec<HeaderEntry>,
}

impl NativeHeader {
    /// Collect ids from `module`
    pub fn from_module(module: &AbcModule) -> Self {
        let mut header = Self::default();

        for (id, instance) in module.instances.iter().enumerate() {
            let class_name = local_name(module, instance.name);
            header.classes.push(HeaderEntry {
                name: class_name.clone(),
                id: id as u32,
            });
            let statics = module.classes.get(id).map(|c| c.traits.as_slice()).unwrap_or(&[]);
            header.add_native(module, &class_name, "ctor", instance.iinit);
            header.add_native_traits(module, &class_name, &instance.traits);
            header.add_native_traits(module, &class_name, statics);
        }

        for (id, script) in module.scripts.iter().enumerate() {
            let package = script_package(module, script.traits.first());
            header.add_native_traits(module, &package, &script.traits);
            header.scripts.push(HeaderEntry {
                name: package,
                id: id as u32,
            });
        }

        header
    }

    fn add_native_traits(&mut self, module: &AbcModule, owner: &str, traits: &[Trait]) {
        for t in traits {
            let (method, suffix) = match t.data {
                TraitData::Method { method, .. } => (method, ""),
                TraitData::Getter { method, .. } => (method, "_get"),
                TraitData::Setter { method, .. } => (method, "_set"),
                _ => continue,
            };
            let name = format!("{}{suffix}", local_name(module, t.name));
            self.add_native(module, owner, &name, method);
        }
    }

    fn add_native(
        &mut self,
        module: &AbcModule,
        owner: &str,
        name: &str,
        method: MethodIndex,
    ) {
        let is_native = module
            .methods
            .get(method.0 as usize)
            .is_some_and(|m| m.flags.contains(MethodFlags::NATIVE));
        if is_native {
            self.methods.push(HeaderEntry {
                name: format!("{owner}_{name}"),
                id: method.0,
            });
        }
    }

    /// Render as a C-style header
    pub fn render(&self) -> String {
        let mut out = String::new();
        let sections = [
            ("native methods", &self.methods),
            ("classes", &self.classes),
            ("scripts", &self.scripts),
        ];
        for (title, entries) in sections {
            let _ = writeln!(out, "/* {title} */");
            for entry in entries {
                let _ = writeln!(out, "const int {} = {};", entry.name, entry.id);
            }
            out.push('\n');
        }
        out
    }
}

fn local_name(module: &AbcModule, name: MultinameIndex) -> String {
    sanitize(module.constants.multiname_local_name(name).unwrap_or("anonymous"))
}

fn script_package(module: &AbcModule, first: Option<&Trait>) -> String {
    let package = first
        .and_then(|t| match module.constants.get_multiname(t.name)? {
            MultinameEntry::QName { ns, .. } => module.constants.get_namespace(*ns),
            _ => None,
        })
        .and_then(|ns| module.constants.get_string(ns.name))
        .unwrap_or("");
    if package.is_empty() {
        "global".to_string()
    } else {
        sanitize(package)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
