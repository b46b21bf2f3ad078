//! Human-readable listings of method bodies

use std::fmt::Write as _;

use crate::error::Result;
use crate::instruction::Instruction;
use crate::method::MethodBody;
use crate::module::AbcModule;
use crate::operand::MethodIndex;
use crate::reader::ByteReader;

/// Decode a code array into `(offset, instruction)` pairs
pub fn decode_code(code: &[u8]) -> Result<Vec<(u32, Instruction)>> {
    let mut reader = ByteReader::new(code);
    let mut decoded = Vec::new();
    while !reader.is_empty() {
        let offset = reader.position() as u32;
        decoded.push((offset, Instruction::decode(&mut reader)?));
    }
    Ok(decoded)
}

/// Absolute targets of the branch instruction at `offset`
///
/// Plain branches are relative to the end of their 3-byte field; lookup
/// switch displacements are relative to the opcode itself.
pub fn branch_targets(offset: u32, instruction: &Instruction) -> Vec<i64> {
    let offset = i64::from(offset);
    match instruction {
        Instruction::Branch { offset: disp, .. } => vec![offset + 4 + i64::from(disp.0)],
        Instruction::LookupSwitch { default, cases } => std::iter::once(default)
            .chain(cases)
            .map(|disp| offset + i64::from(disp.0))
            .collect(),
        _ => Vec::new(),
    }
}

/// Listing generator bound to one module's constant pool
#[derive(Debug, Clone, Copy)]
pub struct Disassembler<'a> {
    module: &'a AbcModule,
}

impl<'a> Disassembler<'a> {
    /// Create a disassembler for `module`
    pub fn new(module: &'a AbcModule) -> Self {
        Self { module }
    }

    /// Listing of every method body in the module
    pub fn module_listing(&self) -> Result<String> {
        let mut out = String::new();
        for body in &self.module.bodies {
            out.push_str(&self.body_listing(body)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Listing of one method body
    pub fn body_listing(&self, body: &MethodBody) -> Result<String> {
        let pool = &self.module.constants;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "method #{} {} (max_stack={} locals={} scope={}..{})",
            body.method.0,
            display_name(self.module.method_name(body.method)),
            body.max_stack,
            body.local_count,
            body.init_scope_depth,
            body.max_scope_depth,
        );
        for (offset, instruction) in decode_code(&body.code)? {
            let text = format_instruction(self.module, offset, &instruction);
            let _ = writeln!(out, "  {offset:5}  {text}");
        }
        for (i, entry) in body.exceptions.iter().enumerate() {
            let _ = writeln!(
                out,
                "  exception #{i}: [{}, {}) -> {} type={} var={}",
                entry.from,
                entry.to,
                entry.target,
                pool.display_multiname(entry.exc_type),
                pool.display_multiname(entry.var_name),
            );
        }
        Ok(out)
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() { "<anonymous>" } else { name }
}

/// Render one instruction with resolved operands
pub fn format_instruction(module: &AbcModule, offset: u32, instruction: &Instruction) -> String {
    let pool = &module.constants;
    let mnemonic = instruction.opcode().mnemonic();
    let method = |index: MethodIndex| format!("#{} {}", index.0, display_name(module.method_name(index)));
    let operands = match instruction {
        Instruction::Simple(_) => String::new(),
        Instruction::Branch { .. } => format!("L{}", branch_targets(offset, instruction)[0]),
        Instruction::LookupSwitch { .. } => {
            let targets = branch_targets(offset, instruction);
            let cases = targets[1..]
                .iter()
                .map(|t| format!("L{t}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("default:L{} [{cases}]", targets[0])
        }
        Instruction::PushByte(v) => v.to_string(),
        Instruction::PushShort(v) => v.to_string(),
        Instruction::PushString(s) | Instruction::Dxns(s) | Instruction::DebugFile(s) => {
            format!("{:?}", pool.get_string(*s).unwrap_or(""))
        }
        Instruction::PushInt(i) => pool.get_int(*i).map(|v| v.to_string()).unwrap_or_default(),
        Instruction::PushUint(i) => pool.get_uint(*i).map(|v| v.to_string()).unwrap_or_default(),
        Instruction::PushDouble(i) => {
            pool.get_double(*i).map(|v| v.to_string()).unwrap_or_default()
        }
        Instruction::PushNamespace(i) => pool
            .get_namespace(*i)
            .and_then(|ns| pool.get_string(ns.name))
            .map(|s| format!("{s:?}"))
            .unwrap_or_default(),
        Instruction::Local { register, .. } => register.0.to_string(),
        Instruction::HasNext2 { object, index } => format!("{}, {}", object.0, index.0),
        Instruction::Name { name, .. } => pool.display_multiname(*name),
        Instruction::CallName {
            name, arg_count, ..
        } => format!("{}, {arg_count}", pool.display_multiname(*name)),
        Instruction::Args { arg_count, .. } => arg_count.to_string(),
        Instruction::CallMethod { disp_id, arg_count } => format!("{disp_id}, {arg_count}"),
        Instruction::CallStatic { method: m, arg_count } => format!("{}, {arg_count}", method(*m)),
        Instruction::Slot { slot, .. } => slot.to_string(),
        Instruction::NewFunction(m) => method(*m),
        Instruction::NewClass(c) => format!("#{}", c.0),
        Instruction::NewCatch(n) => n.to_string(),
        Instruction::GetScopeObject(n) => n.to_string(),
        Instruction::Debug {
            debug_type,
            name,
            register,
            ..
        } => format!(
            "{debug_type}, {:?}, {register}",
            pool.get_string(*name).unwrap_or("")
        ),
        Instruction::DebugLine(line) | Instruction::BkptLine(line) => line.to_string(),
    };
    if operands.is_empty() {
        mnemonic.to_string()
    } else {
        format!("{mnemonic:<16}{operands}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ByteBuffer;
    use crate::instruction::{BranchOp, SimpleOp};
    use crate::operand::JumpOffset;

    #[test]
    fn test_decode_code_offsets() {
        let mut buf = ByteBuffer::new();
        Instruction::PushByte(2).encode(&mut buf).unwrap();
        Instruction::Branch {
            op: BranchOp::Jump,
            offset: JumpOffset(1),
        }
        .encode(&mut buf)
        .unwrap();
        Instruction::simple(SimpleOp::Nop).encode(&mut buf).unwrap();
        Instruction::simple(SimpleOp::ReturnVoid).encode(&mut buf).unwrap();

        let decoded = decode_code(buf.as_slice()).unwrap();
        let offsets: Vec<u32> = decoded.iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![0, 2, 6, 7]);
        // jump at 2 skips the nop at 6 and lands on returnvoid
        assert_eq!(branch_targets(2, &decoded[1].1), vec![7]);
    }

    #[test]
    fn test_listing_resolves_names() {
        let mut module = AbcModule::new();
        let name = module.constants.string("f");
        let s = module.constants.string("hello");
        module
            .methods
            .push(crate::method::MethodInfo::builder().name(name).build());
        let mut code = ByteBuffer::new();
        Instruction::PushString(s).encode(&mut code).unwrap();
        Instruction::simple(SimpleOp::ReturnValue).encode(&mut code).unwrap();
        module.bodies.push(MethodBody {
            method: MethodIndex(0),
            max_stack: 1,
            local_count: 1,
            code: code.into_bytes(),
            ..Default::default()
        });

        let listing = Disassembler::new(&module).module_listing().unwrap();
        assert!(listing.contains("method #0 f"));
        assert!(listing.contains("pushstring      \"hello\""));
        assert!(listing.contains("returnvalue"));
    }
}
