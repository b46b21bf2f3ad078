//! Instruction catalogue
//!
//! Thin wrappers over [`Emitter::emit`] for each operation the front end
//! needs. Every instruction goes through the same primitive, which flushes
//! pending debug positions and updates the depth counters of the open method.

use avmc_bytecode::{
    ArgsOp, CallNameOp, ClassIndex, ConstantPool, Instruction, LocalOp, MethodIndex,
    Multiname, MultinameIndex, NameOp, Namespace, Register, SimpleOp, SlotOp,
};

use crate::codegen::SavedScope;
use crate::emitter::Emitter;
use crate::error::{EmitError, EmitResult};

/// Smallest instruction pushing `value`
pub(crate) fn int_instruction(pool: &mut ConstantPool, value: i32) -> Instruction {
    if let Ok(byte) = i8::try_from(value) {
        Instruction::PushByte(byte)
    } else if let Ok(short) = i16::try_from(value) {
        Instruction::PushShort(short)
    } else {
        Instruction::PushInt(pool.int(value))
    }
}

/// Operators taking one operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// `-x`
    Negate,
    /// `~x`
    BitNot,
    /// `!x`
    Not,
    /// `typeof x`
    TypeOf,
    /// `x + 1` as a number
    Increment,
    /// `x - 1` as a number
    Decrement,
    /// `-x` on ints
    NegateI,
    /// `x + 1` on ints
    IncrementI,
    /// `x - 1` on ints
    DecrementI,
}

impl UnaryOperator {
    fn op(self) -> SimpleOp {
        match self {
            Self::Negate => SimpleOp::Negate,
            Self::BitNot => SimpleOp::BitNot,
            Self::Not => SimpleOp::Not,
            Self::TypeOf => SimpleOp::TypeOf,
            Self::Increment => SimpleOp::Increment,
            Self::Decrement => SimpleOp::Decrement,
            Self::NegateI => SimpleOp::NegateI,
            Self::IncrementI => SimpleOp::IncrementI,
            Self::DecrementI => SimpleOp::DecrementI,
        }
    }
}

/// Operators taking two operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
    /// `<<`
    LShift,
    /// `>>`
    RShift,
    /// `>>>`
    URShift,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `==`
    Equals,
    /// `!=`
    NotEquals,
    /// `===`
    StrictEquals,
    /// `!==`
    StrictNotEquals,
    /// `<`
    LessThan,
    /// `<=`
    LessEquals,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterEquals,
    /// `instanceof`
    InstanceOf,
    /// `is` with a type on the stack
    Is,
    /// `as` with a type on the stack
    As,
    /// `in`
    In,
    /// `+` on ints
    AddI,
    /// `-` on ints
    SubtractI,
    /// `*` on ints
    MultiplyI,
}

impl BinaryOperator {
    /// Instruction plus whether the result is negated afterwards
    fn ops(self) -> (SimpleOp, bool) {
        use BinaryOperator::*;
        let op = match self {
            Add => SimpleOp::Add,
            Subtract => SimpleOp::Subtract,
            Multiply => SimpleOp::Multiply,
            Divide => SimpleOp::Divide,
            Modulo => SimpleOp::Modulo,
            LShift => SimpleOp::LShift,
            RShift => SimpleOp::RShift,
            URShift => SimpleOp::URShift,
            BitAnd => SimpleOp::BitAnd,
            BitOr => SimpleOp::BitOr,
            BitXor => SimpleOp::BitXor,
            Equals | NotEquals => SimpleOp::Equals,
            StrictEquals | StrictNotEquals => SimpleOp::StrictEquals,
            LessThan => SimpleOp::LessThan,
            LessEquals => SimpleOp::LessEquals,
            GreaterThan => SimpleOp::GreaterThan,
            GreaterEquals => SimpleOp::GreaterEquals,
            InstanceOf => SimpleOp::InstanceOf,
            Is => SimpleOp::IsTypeLate,
            As => SimpleOp::AsTypeLate,
            In => SimpleOp::In,
            AddI => SimpleOp::AddI,
            SubtractI => SimpleOp::SubtractI,
            MultiplyI => SimpleOp::MultiplyI,
        };
        (op, matches!(self, NotEquals | StrictNotEquals))
    }
}

/// Target type of a coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoerceKind {
    /// `*`
    Any,
    /// `String` (null stays null)
    String,
    /// `Boolean`
    Boolean,
    /// `int`
    Int,
    /// `uint`
    Uint,
    /// `Number`
    Double,
    /// `Object`
    Object,
}

/// Target type of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertKind {
    /// `String` (null becomes "null")
    String,
    /// `int`
    Int,
    /// `uint`
    Uint,
    /// `Number`
    Double,
    /// `Boolean`
    Boolean,
    /// `Object` (throws on null)
    Object,
}

impl Emitter {
    /// Append one instruction to the open method
    pub fn emit(&mut self, instruction: Instruction) -> EmitResult<u32> {
        self.flush_position()?;
        self.emit_raw(&instruction)
    }

    /// Append without flushing debug positions
    pub(crate) fn emit_raw(&mut self, instruction: &Instruction) -> EmitResult<u32> {
        let (pool, method) = self.split()?;
        method.emit(instruction, pool)
    }

    /// Emit an operand-less instruction
    pub fn simple(&mut self, op: SimpleOp) -> EmitResult<()> {
        self.emit(Instruction::simple(op))?;
        Ok(())
    }

    fn name_op(&mut self, op: NameOp, name: &Multiname) -> EmitResult<()> {
        let name = self.assembler.pool.multiname(name);
        self.emit(Instruction::Name { op, name })?;
        Ok(())
    }

    fn call_name_op(&mut self, op: CallNameOp, name: &Multiname, arg_count: u32) -> EmitResult<()> {
        let name = self.assembler.pool.multiname(name);
        self.emit(Instruction::CallName {
            op,
            name,
            arg_count,
        })?;
        Ok(())
    }

    fn args_op(&mut self, op: ArgsOp, arg_count: u32) -> EmitResult<()> {
        self.emit(Instruction::Args { op, arg_count })?;
        Ok(())
    }

    fn local_op(&mut self, op: LocalOp, register: Register) -> EmitResult<()> {
        self.emit(Instruction::Local { op, register })?;
        Ok(())
    }

    fn slot_op(&mut self, op: SlotOp, slot: u32) -> EmitResult<()> {
        self.emit(Instruction::Slot { op, slot })?;
        Ok(())
    }

    fn static_name(&mut self, name: &Multiname, what: &str) -> EmitResult<MultinameIndex> {
        let index = self.assembler.pool.multiname(name);
        if self.assembler.pool.runtime_arity(index) > 0 {
            return Err(EmitError::unsupported(format!(
                "{what} with a run-time qualified name"
            )));
        }
        Ok(index)
    }

    // Locals

    /// Push a local register
    pub fn get_local(&mut self, register: Register) -> EmitResult<()> {
        match register.0 {
            0 => self.simple(SimpleOp::GetLocal0),
            1 => self.simple(SimpleOp::GetLocal1),
            2 => self.simple(SimpleOp::GetLocal2),
            3 => self.simple(SimpleOp::GetLocal3),
            _ => self.local_op(LocalOp::GetLocal, register),
        }
    }

    /// Pop into a local register
    pub fn set_local(&mut self, register: Register) -> EmitResult<()> {
        match register.0 {
            0 => self.simple(SimpleOp::SetLocal0),
            1 => self.simple(SimpleOp::SetLocal1),
            2 => self.simple(SimpleOp::SetLocal2),
            3 => self.simple(SimpleOp::SetLocal3),
            _ => self.local_op(LocalOp::SetLocal, register),
        }
    }

    /// Mark a register as dead
    pub fn kill(&mut self, register: Register) -> EmitResult<()> {
        self.local_op(LocalOp::Kill, register)
    }

    /// Increment a register in place
    pub fn inc_local(&mut self, register: Register) -> EmitResult<()> {
        self.local_op(LocalOp::IncLocal, register)
    }

    /// Decrement a register in place
    pub fn dec_local(&mut self, register: Register) -> EmitResult<()> {
        self.local_op(LocalOp::DecLocal, register)
    }

    /// Increment an int register in place
    pub fn inc_local_i(&mut self, register: Register) -> EmitResult<()> {
        self.local_op(LocalOp::IncLocalI, register)
    }

    /// Decrement an int register in place
    pub fn dec_local_i(&mut self, register: Register) -> EmitResult<()> {
        self.local_op(LocalOp::DecLocalI, register)
    }

    /// Allocate a temporary register
    pub fn alloc_temp(&mut self) -> EmitResult<Register> {
        Ok(self.current_mut()?.alloc_temp())
    }

    /// Kill and release a temporary; must be the most recent allocation
    pub fn free_temp(&mut self, register: Register) -> EmitResult<()> {
        self.kill(register)?;
        self.current_mut()?.free_temp(register);
        Ok(())
    }

    // Constants

    /// Push an integer
    pub fn push_int(&mut self, value: i32) -> EmitResult<()> {
        let instruction = int_instruction(&mut self.assembler.pool, value);
        self.emit(instruction)?;
        Ok(())
    }

    /// Push an unsigned integer
    pub fn push_uint(&mut self, value: u32) -> EmitResult<()> {
        let index = self.assembler.pool.uint(value);
        self.emit(Instruction::PushUint(index))?;
        Ok(())
    }

    /// Push a number
    pub fn push_double(&mut self, value: f64) -> EmitResult<()> {
        if value.is_nan() {
            return self.simple(SimpleOp::PushNaN);
        }
        let index = self.assembler.pool.double(value);
        self.emit(Instruction::PushDouble(index))?;
        Ok(())
    }

    /// Push a string
    pub fn push_string(&mut self, value: &str) -> EmitResult<()> {
        let index = self.assembler.pool.string(value);
        self.emit(Instruction::PushString(index))?;
        Ok(())
    }

    /// Push a boolean
    pub fn push_bool(&mut self, value: bool) -> EmitResult<()> {
        self.simple(if value {
            SimpleOp::PushTrue
        } else {
            SimpleOp::PushFalse
        })
    }

    /// Push `null`
    pub fn push_null(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::PushNull)
    }

    /// Push `undefined`
    pub fn push_undefined(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::PushUndefined)
    }

    /// Push a namespace object
    pub fn push_namespace(&mut self, ns: &Namespace) -> EmitResult<()> {
        let index = self.assembler.pool.namespace(ns);
        self.emit(Instruction::PushNamespace(index))?;
        Ok(())
    }

    // Stack

    /// Duplicate the top value
    pub fn dup(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::Dup)
    }

    /// Discard the top value
    pub fn pop(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::Pop)
    }

    /// Exchange the top two values
    pub fn swap(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::Swap)
    }

    // Properties

    /// Read a property
    pub fn get_property(&mut self, name: &Multiname) -> EmitResult<()> {
        self.name_op(NameOp::GetProperty, name)
    }

    /// Write a property
    pub fn set_property(&mut self, name: &Multiname) -> EmitResult<()> {
        self.name_op(NameOp::SetProperty, name)
    }

    /// Initialize a property (const or instance slot)
    pub fn init_property(&mut self, name: &Multiname) -> EmitResult<()> {
        self.name_op(NameOp::InitProperty, name)
    }

    /// Delete a property, pushing the result
    pub fn delete_property(&mut self, name: &Multiname) -> EmitResult<()> {
        self.name_op(NameOp::DeleteProperty, name)
    }

    /// Read descendants (`x..name`)
    pub fn get_descendants(&mut self, name: &Multiname) -> EmitResult<()> {
        self.name_op(NameOp::GetDescendants, name)
    }

    /// Push the object on the scope chain that has `name`, or the global
    pub fn find_property(&mut self, name: &Multiname) -> EmitResult<()> {
        self.name_op(NameOp::FindProperty, name)
    }

    /// Push the object on the scope chain that has `name`; throw if none
    pub fn find_prop_strict(&mut self, name: &Multiname) -> EmitResult<()> {
        self.name_op(NameOp::FindPropStrict, name)
    }

    /// Push the script object defining `name`
    pub fn find_def(&mut self, name: &Multiname) -> EmitResult<()> {
        self.name_op(NameOp::FindDef, name)
    }

    /// Find and read `name` from the scope chain
    pub fn get_lex(&mut self, name: &Multiname) -> EmitResult<()> {
        self.name_op(NameOp::GetLex, name)
    }

    /// Read a property of the base class
    pub fn get_super(&mut self, name: &Multiname) -> EmitResult<()> {
        let name = self.static_name(name, "super property read")?;
        self.emit(Instruction::Name {
            op: NameOp::GetSuper,
            name,
        })?;
        Ok(())
    }

    /// Write a property of the base class
    pub fn set_super(&mut self, name: &Multiname) -> EmitResult<()> {
        let name = self.static_name(name, "super property write")?;
        self.emit(Instruction::Name {
            op: NameOp::SetSuper,
            name,
        })?;
        Ok(())
    }

    // Calls

    /// Call a property, pushing the result
    pub fn call_property(&mut self, name: &Multiname, arg_count: u32) -> EmitResult<()> {
        self.call_name_op(CallNameOp::CallProperty, name, arg_count)
    }

    /// Call a property, discarding the result
    pub fn call_prop_void(&mut self, name: &Multiname, arg_count: u32) -> EmitResult<()> {
        self.call_name_op(CallNameOp::CallPropVoid, name, arg_count)
    }

    /// Call a property with a null receiver
    pub fn call_prop_lex(&mut self, name: &Multiname, arg_count: u32) -> EmitResult<()> {
        self.call_name_op(CallNameOp::CallPropLex, name, arg_count)
    }

    /// Construct a property
    pub fn construct_prop(&mut self, name: &Multiname, arg_count: u32) -> EmitResult<()> {
        self.call_name_op(CallNameOp::ConstructProp, name, arg_count)
    }

    /// Call a base-class method, pushing the result
    pub fn call_super(&mut self, name: &Multiname, arg_count: u32) -> EmitResult<()> {
        self.static_name(name, "super call")?;
        self.call_name_op(CallNameOp::CallSuper, name, arg_count)
    }

    /// Call a base-class method, discarding the result
    pub fn call_super_void(&mut self, name: &Multiname, arg_count: u32) -> EmitResult<()> {
        self.static_name(name, "super call")?;
        self.call_name_op(CallNameOp::CallSuperVoid, name, arg_count)
    }

    /// Call a function value
    pub fn call(&mut self, arg_count: u32) -> EmitResult<()> {
        self.args_op(ArgsOp::Call, arg_count)
    }

    /// Construct a function value
    pub fn construct(&mut self, arg_count: u32) -> EmitResult<()> {
        self.args_op(ArgsOp::Construct, arg_count)
    }

    /// Run the base-class constructor
    pub fn construct_super(&mut self, arg_count: u32) -> EmitResult<()> {
        self.args_op(ArgsOp::ConstructSuper, arg_count)
    }

    /// Apply type parameters (`Vector.<T>`)
    pub fn apply_type(&mut self, arg_count: u32) -> EmitResult<()> {
        self.args_op(ArgsOp::ApplyType, arg_count)
    }

    /// Build an object from `pairs` name/value pairs
    pub fn new_object(&mut self, pairs: u32) -> EmitResult<()> {
        self.args_op(ArgsOp::NewObject, pairs)
    }

    /// Build an array from `count` values
    pub fn new_array(&mut self, count: u32) -> EmitResult<()> {
        self.args_op(ArgsOp::NewArray, count)
    }

    /// Early-bound call by dispatch id
    pub fn call_method(&mut self, disp_id: u32, arg_count: u32) -> EmitResult<()> {
        self.emit(Instruction::CallMethod { disp_id, arg_count })?;
        Ok(())
    }

    /// Early-bound call by method index
    pub fn call_static(&mut self, method: MethodIndex, arg_count: u32) -> EmitResult<()> {
        self.emit(Instruction::CallStatic { method, arg_count })?;
        Ok(())
    }

    // Slots

    /// Read slot `slot` of the object on the stack
    pub fn get_slot(&mut self, slot: u32) -> EmitResult<()> {
        self.slot_op(SlotOp::GetSlot, slot)
    }

    /// Write slot `slot` of the object on the stack
    pub fn set_slot(&mut self, slot: u32) -> EmitResult<()> {
        self.slot_op(SlotOp::SetSlot, slot)
    }

    /// Read a slot of the global object
    pub fn get_global_slot(&mut self, slot: u32) -> EmitResult<()> {
        self.slot_op(SlotOp::GetGlobalSlot, slot)
    }

    /// Write a slot of the global object
    pub fn set_global_slot(&mut self, slot: u32) -> EmitResult<()> {
        self.slot_op(SlotOp::SetGlobalSlot, slot)
    }

    // Scopes

    /// Push the object on the stack as a scope
    pub fn push_scope(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::PushScope)
    }

    /// Push the object on the stack as a `with` scope
    pub fn push_with(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::PushWith)
    }

    /// Push register `register` as a scope that handlers can restore
    pub fn push_scope_saved(&mut self, register: Register) -> EmitResult<()> {
        self.push_saved(register, false)
    }

    /// Push register `register` as a `with` scope that handlers can restore
    pub fn push_with_saved(&mut self, register: Register) -> EmitResult<()> {
        self.push_saved(register, true)
    }

    pub(crate) fn push_saved(&mut self, register: Register, with: bool) -> EmitResult<()> {
        self.get_local(register)?;
        self.simple(if with {
            SimpleOp::PushWith
        } else {
            SimpleOp::PushScope
        })?;
        let method = self.current_mut()?;
        if let Some(last) = method.scopes.last_mut() {
            *last = Some(SavedScope { register, with });
        }
        Ok(())
    }

    /// Pop the innermost scope
    pub fn pop_scope(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::PopScope)
    }

    /// Push the global scope object
    pub fn get_global_scope(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::GetGlobalScope)
    }

    /// Push scope-stack entry `index`
    pub fn get_scope_object(&mut self, index: u8) -> EmitResult<()> {
        self.emit(Instruction::GetScopeObject(index))?;
        Ok(())
    }

    // Objects

    /// Create the activation object
    pub fn new_activation(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::NewActivation)
    }

    /// Create a closure over `method`
    pub fn new_function(&mut self, method: MethodIndex) -> EmitResult<()> {
        self.emit(Instruction::NewFunction(method))?;
        Ok(())
    }

    /// Create class `class` with the base class on the stack
    pub fn new_class(&mut self, class: ClassIndex) -> EmitResult<()> {
        self.emit(Instruction::NewClass(class))?;
        Ok(())
    }

    /// Create the catch scope for exception entry `index`
    pub fn new_catch(&mut self, index: u32) -> EmitResult<()> {
        self.emit(Instruction::NewCatch(index))?;
        Ok(())
    }

    // Iteration

    /// Advance a for-in loop held in two registers
    pub fn has_next2(&mut self, object: Register, index: Register) -> EmitResult<()> {
        self.emit(Instruction::HasNext2 { object, index })?;
        Ok(())
    }

    /// Push the next property name of a for-in loop
    pub fn next_name(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::NextName)
    }

    /// Push the next property value of a for-each loop
    pub fn next_value(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::NextValue)
    }

    // Operators and types

    /// Apply a unary operator
    pub fn unary(&mut self, operator: UnaryOperator) -> EmitResult<()> {
        self.simple(operator.op())
    }

    /// Apply a binary operator
    pub fn binary(&mut self, operator: BinaryOperator) -> EmitResult<()> {
        let (op, negate) = operator.ops();
        self.simple(op)?;
        if negate {
            self.simple(SimpleOp::Not)?;
        }
        Ok(())
    }

    /// Coerce to a named type
    pub fn coerce(&mut self, type_name: &Multiname) -> EmitResult<()> {
        self.name_op(NameOp::Coerce, type_name)
    }

    /// Coerce to a built-in type
    pub fn coerce_to(&mut self, kind: CoerceKind) -> EmitResult<()> {
        self.simple(match kind {
            CoerceKind::Any => SimpleOp::CoerceA,
            CoerceKind::String => SimpleOp::CoerceS,
            CoerceKind::Boolean => SimpleOp::CoerceB,
            CoerceKind::Int => SimpleOp::CoerceI,
            CoerceKind::Uint => SimpleOp::CoerceU,
            CoerceKind::Double => SimpleOp::CoerceD,
            CoerceKind::Object => SimpleOp::CoerceO,
        })
    }

    /// Convert to a built-in type
    pub fn convert(&mut self, kind: ConvertKind) -> EmitResult<()> {
        self.simple(match kind {
            ConvertKind::String => SimpleOp::ConvertS,
            ConvertKind::Int => SimpleOp::ConvertI,
            ConvertKind::Uint => SimpleOp::ConvertU,
            ConvertKind::Double => SimpleOp::ConvertD,
            ConvertKind::Boolean => SimpleOp::ConvertB,
            ConvertKind::Object => SimpleOp::ConvertO,
        })
    }

    /// `value as Type`
    pub fn as_type(&mut self, type_name: &Multiname) -> EmitResult<()> {
        self.name_op(NameOp::AsType, type_name)
    }

    /// `value is Type`
    pub fn is_type(&mut self, type_name: &Multiname) -> EmitResult<()> {
        self.name_op(NameOp::IsType, type_name)
    }

    /// Throw the value on the stack
    pub fn throw(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::Throw)
    }

    // XML

    /// Set the default XML namespace
    pub fn dxns(&mut self, uri: &str) -> EmitResult<()> {
        let uri = self.assembler.pool.string(uri);
        self.emit(Instruction::Dxns(uri))?;
        self.current_mut()?.sets_dxns = true;
        Ok(())
    }

    /// Set the default XML namespace from the stack
    pub fn dxns_late(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::DxnsLate)?;
        self.current_mut()?.sets_dxns = true;
        Ok(())
    }

    /// Check that the value on the stack supports filtering
    pub fn check_filter(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::CheckFilter)
    }

    /// Escape an XML element value
    pub fn esc_xelem(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::EscXElem)
    }

    /// Escape an XML attribute value
    pub fn esc_xattr(&mut self) -> EmitResult<()> {
        self.simple(SimpleOp::EscXAttr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::StartMethod;
    use crate::config::EmitterConfig;
    use avmc_bytecode::disasm::decode_code;

    fn open() -> Emitter {
        let mut e = Emitter::new(EmitterConfig::default());
        e.start_method(StartMethod::new("f").params(5)).unwrap();
        e
    }

    fn decoded(e: &Emitter) -> Vec<Instruction> {
        decode_code(e.current().unwrap().code())
            .unwrap()
            .into_iter()
            .map(|(_, i)| i)
            .collect()
    }

    #[test]
    fn test_int_selection() {
        let mut pool = ConstantPool::new();
        assert_eq!(int_instruction(&mut pool, -128), Instruction::PushByte(-128));
        assert_eq!(int_instruction(&mut pool, 300), Instruction::PushShort(300));
        assert!(matches!(
            int_instruction(&mut pool, 70_000),
            Instruction::PushInt(_)
        ));
        assert_eq!(pool.ints.len(), 1);
    }

    #[test]
    fn test_short_local_forms() {
        let mut e = open();
        e.get_local(Register(2)).unwrap();
        e.set_local(Register(5)).unwrap();
        assert_eq!(
            decoded(&e),
            vec![
                Instruction::simple(SimpleOp::GetLocal2),
                Instruction::Local {
                    op: LocalOp::SetLocal,
                    register: Register(5),
                },
            ]
        );
    }

    #[test]
    fn test_not_equals_negates() {
        let mut e = open();
        e.push_int(1).unwrap();
        e.push_int(2).unwrap();
        e.binary(BinaryOperator::StrictNotEquals).unwrap();
        let ops = decoded(&e);
        assert_eq!(ops[2], Instruction::simple(SimpleOp::StrictEquals));
        assert_eq!(ops[3], Instruction::simple(SimpleOp::Not));
        assert_eq!(e.current().unwrap().depth().stack, 1);
    }

    #[test]
    fn test_nan_uses_pushnan() {
        let mut e = open();
        e.push_double(f64::NAN).unwrap();
        assert_eq!(decoded(&e), vec![Instruction::simple(SimpleOp::PushNaN)]);
        assert!(e.pool().doubles.is_empty());
    }

    #[test]
    fn test_late_bound_super_is_unsupported() {
        let mut e = open();
        let late = Multiname::late(vec![Namespace::public()]);
        assert!(matches!(
            e.get_super(&late),
            Err(EmitError::Unsupported(_))
        ));
        assert!(matches!(
            e.call_super(&late, 0),
            Err(EmitError::Unsupported(_))
        ));
        assert!(e.get_super(&Multiname::public("x")).is_ok());
    }

    #[test]
    fn test_temps_are_lifo() {
        let mut e = open();
        let a = e.alloc_temp().unwrap();
        let b = e.alloc_temp().unwrap();
        assert_eq!(a.0, 6);
        assert_eq!(b.0, 7);
        e.free_temp(b).unwrap();
        e.free_temp(a).unwrap();
        assert_eq!(e.current().unwrap().local_count(), 8);
    }

    #[test]
    fn test_dxns_sets_flag() {
        let mut e = open();
        e.dxns("http://ns").unwrap();
        assert!(e.current().unwrap().sets_dxns);
    }
}
