//! Instructions: operand layout, stack effect and codec
//!
//! Opcodes are grouped into families by operand shape. Every family knows
//! its opcode byte, how many operand-stack and scope-stack entries it pushes
//! or pops, and how to encode and decode its operands, so adding an opcode
//! without a stack effect or an encoder does not compile.

use serde::Serialize;

use crate::buffer::ByteBuffer;
use crate::constant::ConstantPool;
use crate::error::{BytecodeError, Result};
use crate::opcode::Opcode;
use crate::operand::{
    ClassIndex, DoubleIndex, IntIndex, JumpOffset, MethodIndex, MultinameIndex, NamespaceIndex,
    Register, StringIndex, UintIndex,
};
use crate::reader::ByteReader;

macro_rules! op_family {
    ($(#[$meta:meta])* $family:ident { $($(#[$doc:meta])* $variant:ident,)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum $family {
            $($(#[$doc])* $variant,)*
        }

        impl $family {
            /// Opcode byte for this operation
            pub const fn opcode(self) -> Opcode {
                match self {
                    $(Self::$variant => Opcode::$variant,)*
                }
            }

            /// Family member for `opcode`, if it belongs to this family
            pub fn from_opcode(opcode: Opcode) -> Option<Self> {
                match opcode {
                    $(Opcode::$variant => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

op_family! {
    /// Operations without operands
    SimpleOp {
        Bkpt, Nop, Throw, DxnsLate, Label, PushWith, PopScope, NextName, HasNext,
        PushNull, PushUndefined, NextValue, PushTrue, PushFalse, PushNaN, Pop, Dup, Swap,
        PushScope, ReturnVoid, ReturnValue, NewActivation, GetGlobalScope,
        ConvertS, EscXElem, EscXAttr, ConvertI, ConvertU, ConvertD, ConvertB, ConvertO,
        CheckFilter, CoerceB, CoerceA, CoerceI, CoerceD, CoerceS, AsTypeLate, CoerceU, CoerceO,
        Negate, Increment, Decrement, TypeOf, Not, BitNot,
        Add, Subtract, Multiply, Divide, Modulo, LShift, RShift, URShift, BitAnd, BitOr, BitXor,
        Equals, StrictEquals, LessThan, LessEquals, GreaterThan, GreaterEquals,
        InstanceOf, IsTypeLate, In,
        IncrementI, DecrementI, NegateI, AddI, SubtractI, MultiplyI,
        GetLocal0, GetLocal1, GetLocal2, GetLocal3, SetLocal0, SetLocal1, SetLocal2, SetLocal3,
    }
}

op_family! {
    /// Branches with a single s24 displacement
    BranchOp {
        IfNlt, IfNle, IfNgt, IfNge, Jump, IfTrue, IfFalse, IfEq, IfNe,
        IfLt, IfLe, IfGt, IfGe, IfStrictEq, IfStrictNe,
    }
}

op_family! {
    /// Operations on one local register
    LocalOp {
        GetLocal, SetLocal, Kill, IncLocal, DecLocal, IncLocalI, DecLocalI,
    }
}

op_family! {
    /// Operations taking one multiname operand
    NameOp {
        GetSuper, SetSuper, FindPropStrict, FindProperty, FindDef, GetLex, SetProperty,
        InitProperty, GetProperty, DeleteProperty, GetDescendants, Coerce, AsType, IsType,
    }
}

op_family! {
    /// Calls taking a multiname and an argument count
    CallNameOp {
        CallSuper, CallProperty, ConstructProp, CallPropLex, CallSuperVoid, CallPropVoid,
    }
}

op_family! {
    /// Operations taking only an argument count
    ArgsOp {
        Call, Construct, ConstructSuper, ApplyType, NewObject, NewArray,
    }
}

op_family! {
    /// Slot access by slot id
    SlotOp {
        GetSlot, SetSlot, GetGlobalSlot, SetGlobalSlot,
    }
}

impl SimpleOp {
    /// Net operand-stack change
    pub const fn stack_effect(self) -> i32 {
        use SimpleOp::*;
        match self {
            Bkpt | Nop | Label | Swap | PopScope | ReturnVoid => 0,
            PushNull | PushUndefined | PushTrue | PushFalse | PushNaN | Dup | NewActivation
            | GetGlobalScope | GetLocal0 | GetLocal1 | GetLocal2 | GetLocal3 => 1,
            Throw | DxnsLate | PushWith | PushScope | Pop | ReturnValue | SetLocal0
            | SetLocal1 | SetLocal2 | SetLocal3 => -1,
            NextName | NextValue | HasNext => -1,
            ConvertS | EscXElem | EscXAttr | ConvertI | ConvertU | ConvertD | ConvertB
            | ConvertO | CheckFilter | CoerceB | CoerceA | CoerceI | CoerceD | CoerceS
            | CoerceU | CoerceO => 0,
            Negate | Increment | Decrement | TypeOf | Not | BitNot | IncrementI | DecrementI
            | NegateI => 0,
            AsTypeLate | Add | Subtract | Multiply | Divide | Modulo | LShift | RShift
            | URShift | BitAnd | BitOr | BitXor | Equals | StrictEquals | LessThan
            | LessEquals | GreaterThan | GreaterEquals | InstanceOf | IsTypeLate | In | AddI
            | SubtractI | MultiplyI => -1,
        }
    }

    /// Net scope-stack change
    pub const fn scope_effect(self) -> i32 {
        match self {
            Self::PushScope | Self::PushWith => 1,
            Self::PopScope => -1,
            _ => 0,
        }
    }

    /// Register touched by the short local forms
    pub const fn register(self) -> Option<u32> {
        match self {
            Self::GetLocal0 | Self::SetLocal0 => Some(0),
            Self::GetLocal1 | Self::SetLocal1 => Some(1),
            Self::GetLocal2 | Self::SetLocal2 => Some(2),
            Self::GetLocal3 | Self::SetLocal3 => Some(3),
            _ => None,
        }
    }
}

impl BranchOp {
    /// Net operand-stack change
    pub const fn stack_effect(self) -> i32 {
        match self {
            Self::Jump => 0,
            Self::IfTrue | Self::IfFalse => -1,
            _ => -2,
        }
    }

    /// Branch taken when the condition fails
    ///
    /// Used to turn "branch if true" into "branch if false" and back.
    pub const fn negate(self) -> Self {
        use BranchOp::*;
        match self {
            Jump => Jump,
            IfTrue => IfFalse,
            IfFalse => IfTrue,
            IfEq => IfNe,
            IfNe => IfEq,
            IfStrictEq => IfStrictNe,
            IfStrictNe => IfStrictEq,
            IfLt => IfNlt,
            IfNlt => IfLt,
            IfLe => IfNle,
            IfNle => IfLe,
            IfGt => IfNgt,
            IfNgt => IfGt,
            IfGe => IfNge,
            IfNge => IfGe,
        }
    }
}

impl LocalOp {
    /// Net operand-stack change
    pub const fn stack_effect(self) -> i32 {
        match self {
            Self::GetLocal => 1,
            Self::SetLocal => -1,
            _ => 0,
        }
    }
}

impl NameOp {
    /// Net operand-stack change for a name needing `runtime` stack values
    pub const fn stack_effect(self, runtime: i32) -> i32 {
        use NameOp::*;
        let base = match self {
            FindPropStrict | FindProperty | FindDef | GetLex => 1,
            GetSuper | GetProperty | DeleteProperty | GetDescendants | Coerce | AsType
            | IsType => 0,
            SetSuper | SetProperty | InitProperty => -2,
        };
        base - runtime
    }
}

impl CallNameOp {
    /// Net operand-stack change
    pub const fn stack_effect(self, arg_count: i32, runtime: i32) -> i32 {
        match self {
            Self::CallSuperVoid | Self::CallPropVoid => -(arg_count + 1) - runtime,
            _ => -arg_count - runtime,
        }
    }
}

impl ArgsOp {
    /// Net operand-stack change
    pub const fn stack_effect(self, arg_count: i32) -> i32 {
        match self {
            Self::Call | Self::ConstructSuper => -(arg_count + 1),
            Self::Construct | Self::ApplyType => -arg_count,
            Self::NewObject => 1 - 2 * arg_count,
            Self::NewArray => 1 - arg_count,
        }
    }
}

impl SlotOp {
    /// Net operand-stack change
    pub const fn stack_effect(self) -> i32 {
        match self {
            Self::GetSlot => 0,
            Self::SetSlot => -2,
            Self::GetGlobalSlot => 1,
            Self::SetGlobalSlot => -1,
        }
    }
}

/// One decoded or to-be-encoded instruction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Instruction {
    /// No operands
    Simple(SimpleOp),
    /// Relative branch
    Branch {
        /// Branch kind
        op: BranchOp,
        /// Displacement from the end of the instruction
        offset: JumpOffset,
    },
    /// Jump table; displacements are relative to the opcode address
    LookupSwitch {
        /// Default target
        default: JumpOffset,
        /// Case targets, indexed by the switch value
        cases: Vec<JumpOffset>,
    },
    /// Push a byte immediate
    PushByte(i8),
    /// Push a 16-bit immediate
    PushShort(i16),
    /// Push a string constant
    PushString(StringIndex),
    /// Push an int constant
    PushInt(IntIndex),
    /// Push a uint constant
    PushUint(UintIndex),
    /// Push a double constant
    PushDouble(DoubleIndex),
    /// Push a namespace constant
    PushNamespace(NamespaceIndex),
    /// Local register access
    Local {
        /// Operation
        op: LocalOp,
        /// Register
        register: Register,
    },
    /// `hasnext2` over two registers
    HasNext2 {
        /// Register holding the iterated object
        object: Register,
        /// Register holding the iteration index
        index: Register,
    },
    /// Multiname operation
    Name {
        /// Operation
        op: NameOp,
        /// Property or type name
        name: MultinameIndex,
    },
    /// Named call or construction
    CallName {
        /// Operation
        op: CallNameOp,
        /// Property name
        name: MultinameIndex,
        /// Number of arguments on the stack
        arg_count: u32,
    },
    /// Call or construction by argument count
    Args {
        /// Operation
        op: ArgsOp,
        /// Number of arguments (pairs for `newobject`)
        arg_count: u32,
    },
    /// Early-bound method call by dispatch id
    CallMethod {
        /// Dispatch id
        disp_id: u32,
        /// Number of arguments
        arg_count: u32,
    },
    /// Early-bound call by method index
    CallStatic {
        /// Method
        method: MethodIndex,
        /// Number of arguments
        arg_count: u32,
    },
    /// Slot access
    Slot {
        /// Operation
        op: SlotOp,
        /// Slot id (1-based)
        slot: u32,
    },
    /// Create a closure
    NewFunction(MethodIndex),
    /// Create a class
    NewClass(ClassIndex),
    /// Create a catch scope for exception entry `n`
    NewCatch(u32),
    /// Push scope-stack entry `n`
    GetScopeObject(u8),
    /// Set the default XML namespace
    Dxns(StringIndex),
    /// Debug record (register naming)
    Debug {
        /// Record type (1 = register name)
        debug_type: u8,
        /// Name string
        name: StringIndex,
        /// Register number, biased by -1 for register names
        register: u8,
        /// Extra data (unused, 0)
        extra: u32,
    },
    /// Set current source line
    DebugLine(u32),
    /// Set current source file
    DebugFile(StringIndex),
    /// Breakpoint on a line
    BkptLine(u32),
}

impl Instruction {
    /// Shorthand for an operand-less instruction
    #[inline]
    pub const fn simple(op: SimpleOp) -> Self {
        Self::Simple(op)
    }

    /// Opcode byte of this instruction
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Simple(op) => op.opcode(),
            Self::Branch { op, .. } => op.opcode(),
            Self::LookupSwitch { .. } => Opcode::LookupSwitch,
            Self::PushByte(_) => Opcode::PushByte,
            Self::PushShort(_) => Opcode::PushShort,
            Self::PushString(_) => Opcode::PushString,
            Self::PushInt(_) => Opcode::PushInt,
            Self::PushUint(_) => Opcode::PushUint,
            Self::PushDouble(_) => Opcode::PushDouble,
            Self::PushNamespace(_) => Opcode::PushNamespace,
            Self::Local { op, .. } => op.opcode(),
            Self::HasNext2 { .. } => Opcode::HasNext2,
            Self::Name { op, .. } => op.opcode(),
            Self::CallName { op, .. } => op.opcode(),
            Self::Args { op, .. } => op.opcode(),
            Self::CallMethod { .. } => Opcode::CallMethod,
            Self::CallStatic { .. } => Opcode::CallStatic,
            Self::Slot { op, .. } => op.opcode(),
            Self::NewFunction(_) => Opcode::NewFunction,
            Self::NewClass(_) => Opcode::NewClass,
            Self::NewCatch(_) => Opcode::NewCatch,
            Self::GetScopeObject(_) => Opcode::GetScopeObject,
            Self::Dxns(_) => Opcode::Dxns,
            Self::Debug { .. } => Opcode::Debug,
            Self::DebugLine(_) => Opcode::DebugLine,
            Self::DebugFile(_) => Opcode::DebugFile,
            Self::BkptLine(_) => Opcode::BkptLine,
        }
    }

    /// Net operand-stack change
    ///
    /// Multiname operands whose name or namespace is supplied at run time
    /// consume extra stack values; `pool` resolves how many.
    pub fn stack_effect(&self, pool: &ConstantPool) -> i32 {
        match self {
            Self::Simple(op) => op.stack_effect(),
            Self::Branch { op, .. } => op.stack_effect(),
            Self::LookupSwitch { .. } => -1,
            Self::PushByte(_)
            | Self::PushShort(_)
            | Self::PushString(_)
            | Self::PushInt(_)
            | Self::PushUint(_)
            | Self::PushDouble(_)
            | Self::PushNamespace(_) => 1,
            Self::Local { op, .. } => op.stack_effect(),
            Self::HasNext2 { .. } => 1,
            Self::Name { op, name } => op.stack_effect(pool.runtime_arity(*name) as i32),
            Self::CallName {
                op,
                name,
                arg_count,
            } => op.stack_effect(*arg_count as i32, pool.runtime_arity(*name) as i32),
            Self::Args { op, arg_count } => op.stack_effect(*arg_count as i32),
            Self::CallMethod { arg_count, .. } | Self::CallStatic { arg_count, .. } => {
                -(*arg_count as i32)
            }
            Self::Slot { op, .. } => op.stack_effect(),
            Self::NewFunction(_) | Self::NewCatch(_) | Self::GetScopeObject(_) => 1,
            Self::NewClass(_) => 0,
            Self::Dxns(_)
            | Self::Debug { .. }
            | Self::DebugLine(_)
            | Self::DebugFile(_)
            | Self::BkptLine(_) => 0,
        }
    }

    /// Net scope-stack change
    pub fn scope_effect(&self) -> i32 {
        match self {
            Self::Simple(op) => op.scope_effect(),
            _ => 0,
        }
    }

    /// Highest local register this instruction reads or writes
    pub fn max_register(&self) -> Option<u32> {
        match self {
            Self::Simple(op) => op.register(),
            Self::Local { register, .. } => Some(register.0),
            Self::HasNext2 { object, index } => Some(object.0.max(index.0)),
            _ => None,
        }
    }

    /// Whether control never falls through to the next instruction
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Simple(SimpleOp::Throw | SimpleOp::ReturnVoid | SimpleOp::ReturnValue)
                | Self::Branch {
                    op: BranchOp::Jump,
                    ..
                }
                | Self::LookupSwitch { .. }
        )
    }

    /// Append the encoded instruction to `out`
    pub fn encode(&self, out: &mut ByteBuffer) -> Result<()> {
        out.write_u8(self.opcode().to_byte());
        match self {
            Self::Simple(_) => {}
            Self::Branch { offset, .. } => out.write_s24(offset.0)?,
            Self::LookupSwitch { default, cases } => {
                if cases.is_empty() {
                    return Err(BytecodeError::InvalidOperand(out.len()));
                }
                out.write_s24(default.0)?;
                out.write_count("lookupswitch case count", cases.len() - 1)?;
                for case in cases {
                    out.write_s24(case.0)?;
                }
            }
            Self::PushByte(value) => out.write_u8(*value as u8),
            Self::PushShort(value) => out.write_u30(u32::from(*value as u16))?,
            Self::PushString(i) => out.write_u30(i.0)?,
            Self::PushInt(i) => out.write_u30(i.0)?,
            Self::PushUint(i) => out.write_u30(i.0)?,
            Self::PushDouble(i) => out.write_u30(i.0)?,
            Self::PushNamespace(i) => out.write_u30(i.0)?,
            Self::Local { register, .. } => out.write_u30(register.0)?,
            Self::HasNext2 { object, index } => {
                out.write_u30(object.0)?;
                out.write_u30(index.0)?;
            }
            Self::Name { name, .. } => out.write_u30(name.0)?,
            Self::CallName {
                name, arg_count, ..
            } => {
                out.write_u30(name.0)?;
                out.write_u30(*arg_count)?;
            }
            Self::Args { arg_count, .. } => out.write_u30(*arg_count)?,
            Self::CallMethod { disp_id, arg_count } => {
                out.write_u30(*disp_id)?;
                out.write_u30(*arg_count)?;
            }
            Self::CallStatic { method, arg_count } => {
                out.write_u30(method.0)?;
                out.write_u30(*arg_count)?;
            }
            Self::Slot { slot, .. } => out.write_u30(*slot)?,
            Self::NewFunction(m) => out.write_u30(m.0)?,
            Self::NewClass(c) => out.write_u30(c.0)?,
            Self::NewCatch(n) => out.write_u30(*n)?,
            Self::GetScopeObject(n) => out.write_u8(*n),
            Self::Dxns(s) => out.write_u30(s.0)?,
            Self::Debug {
                debug_type,
                name,
                register,
                extra,
            } => {
                out.write_u8(*debug_type);
                out.write_u30(name.0)?;
                out.write_u8(*register);
                out.write_u30(*extra)?;
            }
            Self::DebugLine(line) | Self::BkptLine(line) => out.write_u30(*line)?,
            Self::DebugFile(s) => out.write_u30(s.0)?,
        }
        Ok(())
    }

    /// Decode one instruction at the reader's position
    pub fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        let byte = reader.read_u8()?;
        let opcode = Opcode::from_byte(byte).ok_or(BytecodeError::InvalidOpcode(byte))?;

        if let Some(op) = SimpleOp::from_opcode(opcode) {
            return Ok(Self::Simple(op));
        }
        if let Some(op) = BranchOp::from_opcode(opcode) {
            return Ok(Self::Branch {
                op,
                offset: JumpOffset(reader.read_s24()?),
            });
        }
        if let Some(op) = LocalOp::from_opcode(opcode) {
            return Ok(Self::Local {
                op,
                register: Register(reader.read_u30()?),
            });
        }
        if let Some(op) = NameOp::from_opcode(opcode) {
            return Ok(Self::Name {
                op,
                name: MultinameIndex(reader.read_u30()?),
            });
        }
        if let Some(op) = CallNameOp::from_opcode(opcode) {
            let name = MultinameIndex(reader.read_u30()?);
            let arg_count = reader.read_u30()?;
            return Ok(Self::CallName {
                op,
                name,
                arg_count,
            });
        }
        if let Some(op) = ArgsOp::from_opcode(opcode) {
            return Ok(Self::Args {
                op,
                arg_count: reader.read_u30()?,
            });
        }
        if let Some(op) = SlotOp::from_opcode(opcode) {
            return Ok(Self::Slot {
                op,
                slot: reader.read_u30()?,
            });
        }

        let instruction = match opcode {
            Opcode::LookupSwitch => {
                let default = JumpOffset(reader.read_s24()?);
                let count = reader.read_u30()? as usize + 1;
                let mut cases = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    cases.push(JumpOffset(reader.read_s24()?));
                }
                Self::LookupSwitch { default, cases }
            }
            Opcode::PushByte => Self::PushByte(reader.read_u8()? as i8),
            Opcode::PushShort => Self::PushShort(reader.read_u30()? as u16 as i16),
            Opcode::PushString => Self::PushString(StringIndex(reader.read_u30()?)),
            Opcode::PushInt => Self::PushInt(IntIndex(reader.read_u30()?)),
            Opcode::PushUint => Self::PushUint(UintIndex(reader.read_u30()?)),
            Opcode::PushDouble => Self::PushDouble(DoubleIndex(reader.read_u30()?)),
            Opcode::PushNamespace => Self::PushNamespace(NamespaceIndex(reader.read_u30()?)),
            Opcode::HasNext2 => {
                let object = Register(reader.read_u30()?);
                let index = Register(reader.read_u30()?);
                Self::HasNext2 { object, index }
            }
            Opcode::CallMethod => {
                let disp_id = reader.read_u30()?;
                let arg_count = reader.read_u30()?;
                Self::CallMethod { disp_id, arg_count }
            }
            Opcode::CallStatic => {
                let method = MethodIndex(reader.read_u30()?);
                let arg_count = reader.read_u30()?;
                Self::CallStatic { method, arg_count }
            }
            Opcode::NewFunction => Self::NewFunction(MethodIndex(reader.read_u30()?)),
            Opcode::NewClass => Self::NewClass(ClassIndex(reader.read_u30()?)),
            Opcode::NewCatch => Self::NewCatch(reader.read_u30()?),
            Opcode::GetScopeObject => Self::GetScopeObject(reader.read_u8()?),
            Opcode::Dxns => Self::Dxns(StringIndex(reader.read_u30()?)),
            Opcode::Debug => {
                let debug_type = reader.read_u8()?;
                let name = StringIndex(reader.read_u30()?);
                let register = reader.read_u8()?;
                let extra = reader.read_u30()?;
                Self::Debug {
                    debug_type,
                    name,
                    register,
                    extra,
                }
            }
            Opcode::DebugLine => Self::DebugLine(reader.read_u30()?),
            Opcode::DebugFile => Self::DebugFile(StringIndex(reader.read_u30()?)),
            Opcode::BkptLine => Self::BkptLine(reader.read_u30()?),
            _ => return Err(BytecodeError::InvalidOpcode(byte)),
        };
        Ok(instruction)
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        let mut scratch = ByteBuffer::new();
        match self.encode(&mut scratch) {
            Ok(()) => scratch.len(),
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::{Multiname, Namespace};

    fn decode_one(bytes: &[u8]) -> Instruction {
        let mut reader = ByteReader::new(bytes);
        let instruction = Instruction::decode(&mut reader).unwrap();
        assert!(reader.is_empty(), "trailing bytes after decode");
        instruction
    }

    #[test]
    fn test_every_opcode_has_a_family() {
        for &op in Opcode::ALL {
            let families = [
                SimpleOp::from_opcode(op).is_some(),
                BranchOp::from_opcode(op).is_some(),
                LocalOp::from_opcode(op).is_some(),
                NameOp::from_opcode(op).is_some(),
                CallNameOp::from_opcode(op).is_some(),
                ArgsOp::from_opcode(op).is_some(),
                SlotOp::from_opcode(op).is_some(),
            ];
            let in_family = families.iter().filter(|&&b| b).count();
            assert!(in_family <= 1, "{:?} is in more than one family", op);
        }
    }

    #[test]
    fn test_branch_encoding() {
        let mut out = ByteBuffer::new();
        Instruction::Branch {
            op: BranchOp::IfFalse,
            offset: JumpOffset(-4),
        }
        .encode(&mut out)
        .unwrap();
        assert_eq!(out.as_slice(), &[0x12, 0xFC, 0xFF, 0xFF]);
    }

    #[test]
    fn test_lookupswitch_layout() {
        let instruction = Instruction::LookupSwitch {
            default: JumpOffset(20),
            cases: vec![JumpOffset(10), JumpOffset(15)],
        };
        let mut out = ByteBuffer::new();
        instruction.encode(&mut out).unwrap();
        // opcode, default(3), count-1, two cases(3 each)
        assert_eq!(out.len(), 1 + 3 + 1 + 6);
        assert_eq!(out.get(4), Some(1));
        assert_eq!(decode_one(out.as_slice()), instruction);
    }

    #[test]
    fn test_push_short_sign() {
        let mut out = ByteBuffer::new();
        Instruction::PushShort(-300).encode(&mut out).unwrap();
        assert_eq!(decode_one(out.as_slice()), Instruction::PushShort(-300));
    }

    #[test]
    fn test_stack_effect_runtime_names() {
        let mut pool = ConstantPool::new();
        let late = pool.multiname(&Multiname::late(vec![Namespace::public()]));
        let get = Instruction::Name {
            op: NameOp::GetProperty,
            name: late,
        };
        // pops object and runtime name, pushes value
        assert_eq!(get.stack_effect(&pool), -1);

        let call = Instruction::CallName {
            op: CallNameOp::CallPropVoid,
            name: late,
            arg_count: 2,
        };
        assert_eq!(call.stack_effect(&pool), -4);
    }

    #[test]
    fn test_stack_effect_args() {
        let pool = ConstantPool::new();
        let new_object = Instruction::Args {
            op: ArgsOp::NewObject,
            arg_count: 2,
        };
        assert_eq!(new_object.stack_effect(&pool), -3);
        let call = Instruction::Args {
            op: ArgsOp::Call,
            arg_count: 1,
        };
        assert_eq!(call.stack_effect(&pool), -2);
    }

    #[test]
    fn test_scope_effect() {
        assert_eq!(Instruction::simple(SimpleOp::PushScope).scope_effect(), 1);
        assert_eq!(Instruction::simple(SimpleOp::PushWith).scope_effect(), 1);
        assert_eq!(Instruction::simple(SimpleOp::PopScope).scope_effect(), -1);
        assert_eq!(Instruction::simple(SimpleOp::Add).scope_effect(), 0);
    }

    #[test]
    fn test_negate_is_involution() {
        for &op in Opcode::ALL {
            if let Some(branch) = BranchOp::from_opcode(op) {
                assert_eq!(branch.negate().negate(), branch);
            }
        }
    }

    #[test]
    fn test_debug_record() {
        let instruction = Instruction::Debug {
            debug_type: 1,
            name: StringIndex(4),
            register: 0,
            extra: 0,
        };
        let mut out = ByteBuffer::new();
        instruction.encode(&mut out).unwrap();
        assert_eq!(out.as_slice(), &[0xEF, 1, 4, 0, 0]);
        assert_eq!(decode_one(out.as_slice()), instruction);
    }

    #[test]
    fn test_invalid_opcode_decode() {
        let mut reader = ByteReader::new(&[0x00]);
        assert!(matches!(
            Instruction::decode(&mut reader),
            Err(BytecodeError::InvalidOpcode(0))
        ));
    }
}
