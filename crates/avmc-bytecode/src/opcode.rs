//! Opcode bytes and mnemonics

use serde::Serialize;

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $byte:literal => $mnemonic:literal,)*) => {
        /// Stack-machine opcodes
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[repr(u8)]
        pub enum Opcode {
            $($(#[$doc])* $name = $byte,)*
        }

        impl Opcode {
            /// Convert from raw byte
            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Assembler mnemonic
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$name => $mnemonic,)*
                }
            }

            /// Every opcode, in byte order
            pub const ALL: &'static [Opcode] = &[$(Self::$name,)*];
        }
    };
}

opcodes! {
    /// Breakpoint
    Bkpt = 0x01 => "bkpt",
    /// No operation
    Nop = 0x02 => "nop",
    /// Throw the value on top of the stack
    Throw = 0x03 => "throw",
    /// Get a property from the base class
    GetSuper = 0x04 => "getsuper",
    /// Set a property on the base class
    SetSuper = 0x05 => "setsuper",
    /// Set the default XML namespace
    Dxns = 0x06 => "dxns",
    /// Set the default XML namespace from the stack
    DxnsLate = 0x07 => "dxnslate",
    /// Clear a local register
    Kill = 0x08 => "kill",
    /// Backward branch target marker
    Label = 0x09 => "label",
    /// Branch if not less than
    IfNlt = 0x0C => "ifnlt",
    /// Branch if not less than or equal
    IfNle = 0x0D => "ifnle",
    /// Branch if not greater than
    IfNgt = 0x0E => "ifngt",
    /// Branch if not greater than or equal
    IfNge = 0x0F => "ifnge",
    /// Unconditional branch
    Jump = 0x10 => "jump",
    /// Branch if true
    IfTrue = 0x11 => "iftrue",
    /// Branch if false
    IfFalse = 0x12 => "iffalse",
    /// Branch if equal
    IfEq = 0x13 => "ifeq",
    /// Branch if not equal
    IfNe = 0x14 => "ifne",
    /// Branch if less than
    IfLt = 0x15 => "iflt",
    /// Branch if less than or equal
    IfLe = 0x16 => "ifle",
    /// Branch if greater than
    IfGt = 0x17 => "ifgt",
    /// Branch if greater than or equal
    IfGe = 0x18 => "ifge",
    /// Branch if strictly equal
    IfStrictEq = 0x19 => "ifstricteq",
    /// Branch if strictly not equal
    IfStrictNe = 0x1A => "ifstrictne",
    /// Jump table dispatch
    LookupSwitch = 0x1B => "lookupswitch",
    /// Push a `with` scope
    PushWith = 0x1C => "pushwith",
    /// Pop a scope
    PopScope = 0x1D => "popscope",
    /// Property name during for-in iteration
    NextName = 0x1E => "nextname",
    /// Advance a for-in iterator
    HasNext = 0x1F => "hasnext",
    /// Push null
    PushNull = 0x20 => "pushnull",
    /// Push undefined
    PushUndefined = 0x21 => "pushundefined",
    /// Property value during for-each iteration
    NextValue = 0x23 => "nextvalue",
    /// Push a signed byte immediate
    PushByte = 0x24 => "pushbyte",
    /// Push a signed 16-bit immediate
    PushShort = 0x25 => "pushshort",
    /// Push true
    PushTrue = 0x26 => "pushtrue",
    /// Push false
    PushFalse = 0x27 => "pushfalse",
    /// Push NaN
    PushNaN = 0x28 => "pushnan",
    /// Discard top of stack
    Pop = 0x29 => "pop",
    /// Duplicate top of stack
    Dup = 0x2A => "dup",
    /// Swap the two top values
    Swap = 0x2B => "swap",
    /// Push a string constant
    PushString = 0x2C => "pushstring",
    /// Push an int constant
    PushInt = 0x2D => "pushint",
    /// Push a uint constant
    PushUint = 0x2E => "pushuint",
    /// Push a double constant
    PushDouble = 0x2F => "pushdouble",
    /// Push a scope
    PushScope = 0x30 => "pushscope",
    /// Push a namespace constant
    PushNamespace = 0x31 => "pushnamespace",
    /// Register-based for-in iteration step
    HasNext2 = 0x32 => "hasnext2",
    /// Create a closure
    NewFunction = 0x40 => "newfunction",
    /// Call a closure
    Call = 0x41 => "call",
    /// Construct from a constructor object
    Construct = 0x42 => "construct",
    /// Call a method by dispatch id
    CallMethod = 0x43 => "callmethod",
    /// Call a method by method index
    CallStatic = 0x44 => "callstatic",
    /// Call a base-class method
    CallSuper = 0x45 => "callsuper",
    /// Call a property
    CallProperty = 0x46 => "callproperty",
    /// Return from a void method
    ReturnVoid = 0x47 => "returnvoid",
    /// Return a value
    ReturnValue = 0x48 => "returnvalue",
    /// Run the base-class constructor
    ConstructSuper = 0x49 => "constructsuper",
    /// Construct a property
    ConstructProp = 0x4A => "constructprop",
    /// Call a property with a null receiver
    CallPropLex = 0x4C => "callproplex",
    /// Call a base-class method, discarding the result
    CallSuperVoid = 0x4E => "callsupervoid",
    /// Call a property, discarding the result
    CallPropVoid = 0x4F => "callpropvoid",
    /// Apply type parameters
    ApplyType = 0x53 => "applytype",
    /// Create an object from name/value pairs
    NewObject = 0x55 => "newobject",
    /// Create an array
    NewArray = 0x56 => "newarray",
    /// Create the activation object
    NewActivation = 0x57 => "newactivation",
    /// Create a class
    NewClass = 0x58 => "newclass",
    /// XML descendants
    GetDescendants = 0x59 => "getdescendants",
    /// Create a catch scope
    NewCatch = 0x5A => "newcatch",
    /// Find the object holding a property, throwing if absent
    FindPropStrict = 0x5D => "findpropstrict",
    /// Find the object holding a property
    FindProperty = 0x5E => "findproperty",
    /// Find a script-level definition
    FindDef = 0x5F => "finddef",
    /// Find and get a property
    GetLex = 0x60 => "getlex",
    /// Set a property
    SetProperty = 0x61 => "setproperty",
    /// Read a local register
    GetLocal = 0x62 => "getlocal",
    /// Write a local register
    SetLocal = 0x63 => "setlocal",
    /// Push the global scope object
    GetGlobalScope = 0x64 => "getglobalscope",
    /// Push a scope-stack entry
    GetScopeObject = 0x65 => "getscopeobject",
    /// Get a property
    GetProperty = 0x66 => "getproperty",
    /// Initialize a property
    InitProperty = 0x68 => "initproperty",
    /// Delete a property
    DeleteProperty = 0x6A => "deleteproperty",
    /// Read a slot
    GetSlot = 0x6C => "getslot",
    /// Write a slot
    SetSlot = 0x6D => "setslot",
    /// Read a slot of the global object
    GetGlobalSlot = 0x6E => "getglobalslot",
    /// Write a slot of the global object
    SetGlobalSlot = 0x6F => "setglobalslot",
    /// Convert to String
    ConvertS = 0x70 => "convert_s",
    /// Escape XML element content
    EscXElem = 0x71 => "esc_xelem",
    /// Escape XML attribute content
    EscXAttr = 0x72 => "esc_xattr",
    /// Convert to int
    ConvertI = 0x73 => "convert_i",
    /// Convert to uint
    ConvertU = 0x74 => "convert_u",
    /// Convert to Number
    ConvertD = 0x75 => "convert_d",
    /// Convert to Boolean
    ConvertB = 0x76 => "convert_b",
    /// Convert to Object
    ConvertO = 0x77 => "convert_o",
    /// Check the operand of an XML filter
    CheckFilter = 0x78 => "checkfilter",
    /// Coerce to a named type
    Coerce = 0x80 => "coerce",
    /// Coerce to Boolean
    CoerceB = 0x81 => "coerce_b",
    /// Coerce to any
    CoerceA = 0x82 => "coerce_a",
    /// Coerce to int
    CoerceI = 0x83 => "coerce_i",
    /// Coerce to Number
    CoerceD = 0x84 => "coerce_d",
    /// Coerce to String
    CoerceS = 0x85 => "coerce_s",
    /// Cast to a named type or null
    AsType = 0x86 => "astype",
    /// Cast to a type taken from the stack
    AsTypeLate = 0x87 => "astypelate",
    /// Coerce to uint
    CoerceU = 0x88 => "coerce_u",
    /// Coerce to Object
    CoerceO = 0x89 => "coerce_o",
    /// Arithmetic negation
    Negate = 0x90 => "negate",
    /// Add one
    Increment = 0x91 => "increment",
    /// Add one to a local register
    IncLocal = 0x92 => "inclocal",
    /// Subtract one
    Decrement = 0x93 => "decrement",
    /// Subtract one from a local register
    DecLocal = 0x94 => "declocal",
    /// typeof
    TypeOf = 0x95 => "typeof",
    /// Logical not
    Not = 0x96 => "not",
    /// Bitwise not
    BitNot = 0x97 => "bitnot",
    /// Addition
    Add = 0xA0 => "add",
    /// Subtraction
    Subtract = 0xA1 => "subtract",
    /// Multiplication
    Multiply = 0xA2 => "multiply",
    /// Division
    Divide = 0xA3 => "divide",
    /// Remainder
    Modulo = 0xA4 => "modulo",
    /// Left shift
    LShift = 0xA5 => "lshift",
    /// Signed right shift
    RShift = 0xA6 => "rshift",
    /// Unsigned right shift
    URShift = 0xA7 => "urshift",
    /// Bitwise and
    BitAnd = 0xA8 => "bitand",
    /// Bitwise or
    BitOr = 0xA9 => "bitor",
    /// Bitwise xor
    BitXor = 0xAA => "bitxor",
    /// Loose equality
    Equals = 0xAB => "equals",
    /// Strict equality
    StrictEquals = 0xAC => "strictequals",
    /// Less than
    LessThan = 0xAD => "lessthan",
    /// Less than or equal
    LessEquals = 0xAE => "lessequals",
    /// Greater than
    GreaterThan = 0xAF => "greaterthan",
    /// Greater than or equal
    GreaterEquals = 0xB0 => "greaterequals",
    /// instanceof
    InstanceOf = 0xB1 => "instanceof",
    /// Type test against a named type
    IsType = 0xB2 => "istype",
    /// Type test against a type taken from the stack
    IsTypeLate = 0xB3 => "istypelate",
    /// in
    In = 0xB4 => "in",
    /// Integer add one
    IncrementI = 0xC0 => "increment_i",
    /// Integer subtract one
    DecrementI = 0xC1 => "decrement_i",
    /// Integer add one to a local register
    IncLocalI = 0xC2 => "inclocal_i",
    /// Integer subtract one from a local register
    DecLocalI = 0xC3 => "declocal_i",
    /// Integer negation
    NegateI = 0xC4 => "negate_i",
    /// Integer addition
    AddI = 0xC5 => "add_i",
    /// Integer subtraction
    SubtractI = 0xC6 => "subtract_i",
    /// Integer multiplication
    MultiplyI = 0xC7 => "multiply_i",
    /// Read register 0
    GetLocal0 = 0xD0 => "getlocal0",
    /// Read register 1
    GetLocal1 = 0xD1 => "getlocal1",
    /// Read register 2
    GetLocal2 = 0xD2 => "getlocal2",
    /// Read register 3
    GetLocal3 = 0xD3 => "getlocal3",
    /// Write register 0
    SetLocal0 = 0xD4 => "setlocal0",
    /// Write register 1
    SetLocal1 = 0xD5 => "setlocal1",
    /// Write register 2
    SetLocal2 = 0xD6 => "setlocal2",
    /// Write register 3
    SetLocal3 = 0xD7 => "setlocal3",
    /// Debug record
    Debug = 0xEF => "debug",
    /// Set current source line
    DebugLine = 0xF0 => "debugline",
    /// Set current source file
    DebugFile = 0xF1 => "debugfile",
    /// Breakpoint on a line
    BkptLine = 0xF2 => "bkptline",
}

impl Opcode {
    /// Convert to raw byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for &op in Opcode::ALL {
            assert_eq!(Opcode::from_byte(op.to_byte()), Some(op));
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_byte(0x00), None);
        assert_eq!(Opcode::from_byte(0xFF), None);
    }

    #[test]
    fn test_mnemonic() {
        assert_eq!(Opcode::Add.mnemonic(), "add");
        assert_eq!(Opcode::LookupSwitch.mnemonic(), "lookupswitch");
        assert_eq!(Opcode::GetLocal0.mnemonic(), "getlocal0");
    }
}
