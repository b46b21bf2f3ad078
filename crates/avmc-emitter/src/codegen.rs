//! Per-method code generation state
//!
//! A [`MethodState`] owns the instruction buffer of the method being emitted
//! together with its bookkeeping: operand/scope depth, local registers,
//! exception table and the pending-jump stacks of the control-flow patcher.
//! Nested methods each get their own state; the emitter keeps them on a stack.

use avmc_bytecode::{
    BranchOp, ByteBuffer, ConstantPool, ExceptionEntry, Instruction, JumpOffset, Register,
    SimpleOp,
};
use tracing::{trace, warn};

use crate::config::EmitterConfig;
use crate::error::EmitResult;
use crate::exceptions::ExceptionBlock;
use crate::flow::FlowState;

/// How a method receives surplus arguments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArgumentsMode {
    /// No `arguments` object or rest array
    #[default]
    None,
    /// Method reads `arguments`
    Arguments,
    /// Extra arguments are collected into a rest array
    Rest,
}

/// Parameters of StartMethod
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartMethod {
    /// Unique method name; repeated names refer to the same method record
    pub name: String,
    /// Declared parameter count
    pub param_count: u32,
    /// Declared local variable registers
    pub local_count: u32,
    /// Temporaries reserved up front
    pub temp_count: u32,
    /// Method needs an activation object
    pub needs_activation: bool,
    /// `arguments` / rest handling
    pub arguments: ArgumentsMode,
    /// Name written to the method record (defaults to none)
    pub debug_name: Option<String>,
    /// Scope depth the engine establishes before entry
    pub init_scope_depth: u32,
}

impl StartMethod {
    /// Method named `name` with no parameters or locals
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the parameter count
    pub fn params(mut self, count: u32) -> Self {
        self.param_count = count;
        self
    }

    /// Set the declared local count
    pub fn locals(mut self, count: u32) -> Self {
        self.local_count = count;
        self
    }

    /// Set the reserved temporary count
    pub fn temps(mut self, count: u32) -> Self {
        self.temp_count = count;
        self
    }

    /// Request an activation object
    pub fn activation(mut self) -> Self {
        self.needs_activation = true;
        self
    }

    /// Set argument handling
    pub fn arguments(mut self, mode: ArgumentsMode) -> Self {
        self.arguments = mode;
        self
    }

    /// Set the debug name
    pub fn debug_name(mut self, name: impl Into<String>) -> Self {
        self.debug_name = Some(name.into());
        self
    }

    /// Set the initial scope depth
    pub fn init_scope_depth(mut self, depth: u32) -> Self {
        self.init_scope_depth = depth;
        self
    }

    /// First register above the receiver, parameters, arguments, locals and temps
    pub fn first_free_register(&self) -> u32 {
        let arguments = u32::from(self.arguments != ArgumentsMode::None);
        1 + self.param_count + arguments + self.local_count + self.temp_count
    }
}

/// Register allocator
///
/// Registers below `base` belong to the receiver, parameters and declared
/// locals. Temporaries are handed out above it and must be released in
/// reverse order of allocation.
#[derive(Debug, Clone)]
pub struct RegisterAllocator {
    base: u32,
    next: u32,
    max: u32,
}

impl RegisterAllocator {
    /// Create an allocator whose first temporary is `base`
    pub fn new(base: u32) -> Self {
        Self {
            base,
            next: base,
            max: base,
        }
    }

    /// Allocate a register
    pub fn alloc(&mut self) -> Register {
        let reg = Register(self.next);
        self.next += 1;
        self.max = self.max.max(self.next);
        reg
    }

    /// Free a register, returning false if it was not the most recent allocation
    pub fn free(&mut self, reg: Register) -> bool {
        let in_order = self.next > self.base && reg.0 + 1 == self.next;
        if self.next > self.base {
            self.next -= 1;
        }
        in_order
    }

    /// Record that `register` is used
    pub fn touch(&mut self, register: u32) {
        self.max = self.max.max(register + 1);
    }

    /// Number of temporaries currently allocated
    pub fn in_use(&self) -> u32 {
        self.next - self.base
    }

    /// Get maximum registers used
    pub fn max_used(&self) -> u32 {
        self.max
    }
}

/// Running and maximum operand-stack and scope-stack depth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthTracker {
    /// Current operand-stack depth
    pub stack: u32,
    /// Highest operand-stack depth so far
    pub max_stack: u32,
    /// Current scope depth
    pub scope: u32,
    /// Highest scope depth so far
    pub max_scope: u32,
}

impl DepthTracker {
    /// Tracker for a method entered with `init_scope` scopes
    pub fn new(init_scope: u32) -> Self {
        Self {
            stack: 0,
            max_stack: 0,
            scope: init_scope,
            max_scope: init_scope,
        }
    }

    /// Apply stack and scope deltas; false if either would go negative
    pub fn apply(&mut self, stack_delta: i32, scope_delta: i32) -> bool {
        let (stack, stack_ok) = offset(self.stack, stack_delta);
        let (scope, scope_ok) = offset(self.scope, scope_delta);
        self.set_stack(stack);
        self.set_scope(scope);
        stack_ok && scope_ok
    }

    /// Force the operand-stack depth
    pub fn set_stack(&mut self, depth: u32) {
        self.stack = depth;
        self.max_stack = self.max_stack.max(depth);
    }

    /// Force the scope depth
    pub fn set_scope(&mut self, depth: u32) {
        self.scope = depth;
        self.max_scope = self.max_scope.max(depth);
    }
}

fn offset(value: u32, delta: i32) -> (u32, bool) {
    let result = i64::from(value) + i64::from(delta);
    if result < 0 {
        (0, false)
    } else {
        (result as u32, true)
    }
}

/// Location of a reserved 3-byte branch displacement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchHandle {
    site: u32,
}

impl PatchHandle {
    /// Address of the branch opcode
    pub fn site(self) -> u32 {
        self.site
    }

    /// Address of the displacement field
    pub fn field(self) -> u32 {
        self.site + 1
    }
}

/// Scope pushed from a register, so handlers can push it again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedScope {
    /// Register holding the scope object
    pub register: Register,
    /// Pushed with `pushwith`
    pub with: bool,
}

/// Depth counters and scope records saved around a side exit
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub(crate) depth: DepthTracker,
    pub(crate) scopes: Vec<Option<SavedScope>>,
}

/// Everything tracked while one method body is being emitted
#[derive(Debug)]
pub struct MethodState {
    pub(crate) name: String,
    pub(crate) debug_name: Option<String>,
    pub(crate) param_count: u32,
    pub(crate) arguments: ArgumentsMode,
    pub(crate) needs_activation: bool,
    pub(crate) sets_dxns: bool,
    pub(crate) init_scope_depth: u32,
    pub(crate) code: ByteBuffer,
    pub(crate) depth: DepthTracker,
    pub(crate) registers: RegisterAllocator,
    pub(crate) exceptions: Vec<ExceptionEntry>,
    /// One entry per scope pushed in this method, innermost last
    pub(crate) scopes: Vec<Option<SavedScope>>,
    pub(crate) depth_stack: Vec<u32>,
    pub(crate) flow: FlowState,
    pub(crate) handlers: Vec<ExceptionBlock>,
    strict_ordering: bool,
    trace: bool,
}

impl MethodState {
    /// Fresh state for `start`
    pub fn new(start: &StartMethod, config: &EmitterConfig) -> Self {
        Self {
            name: start.name.clone(),
            debug_name: start.debug_name.clone(),
            param_count: start.param_count,
            arguments: start.arguments,
            needs_activation: start.needs_activation,
            sets_dxns: false,
            init_scope_depth: start.init_scope_depth,
            code: ByteBuffer::with_capacity(64),
            depth: DepthTracker::new(start.init_scope_depth),
            registers: RegisterAllocator::new(start.first_free_register()),
            exceptions: Vec::new(),
            scopes: Vec::new(),
            depth_stack: Vec::new(),
            flow: FlowState::default(),
            handlers: Vec::new(),
            strict_ordering: config.strict_ordering,
            trace: config.trace_instructions,
        }
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current code address
    #[inline]
    pub fn position(&self) -> u32 {
        self.code.position()
    }

    /// Depth counters
    pub fn depth(&self) -> DepthTracker {
        self.depth
    }

    /// Encoded instructions so far
    pub fn code(&self) -> &[u8] {
        self.code.as_slice()
    }

    /// Number of local registers the body needs
    pub fn local_count(&self) -> u32 {
        self.registers.max_used()
    }

    /// Append an instruction and apply its stack, scope and register effects
    ///
    /// Returns the address of the opcode byte.
    pub fn emit(&mut self, instruction: &Instruction, pool: &ConstantPool) -> EmitResult<u32> {
        let site = self.position();
        instruction.encode(&mut self.code)?;

        let scope_delta = instruction.scope_effect();
        if !self.depth.apply(instruction.stack_effect(pool), scope_delta) {
            self.ordering_violation(&format!(
                "stack underflow at {site} ({})",
                instruction.opcode().mnemonic()
            ));
        }
        if scope_delta > 0 {
            self.scopes.push(None);
        } else if scope_delta < 0 {
            self.scopes.pop();
        }
        if let Some(register) = instruction.max_register() {
            self.registers.touch(register);
        }

        if self.trace {
            trace!(
                method = %self.name,
                offset = site,
                stack = self.depth.stack,
                scope = self.depth.scope,
                "{}",
                instruction.opcode().mnemonic()
            );
        }
        Ok(site)
    }

    /// Emit a branch with a placeholder displacement
    pub fn reserve_branch(&mut self, op: BranchOp, pool: &ConstantPool) -> EmitResult<PatchHandle> {
        let site = self.emit(
            &Instruction::Branch {
                op,
                offset: JumpOffset::PLACEHOLDER,
            },
            pool,
        )?;
        Ok(PatchHandle { site })
    }

    /// Emit a branch to an already known address
    pub fn branch_to(&mut self, op: BranchOp, target: u32, pool: &ConstantPool) -> EmitResult<()> {
        let end = i64::from(self.position()) + 4;
        let offset = JumpOffset(displacement(i64::from(target) - end)?);
        self.emit(&Instruction::Branch { op, offset }, pool)?;
        Ok(())
    }

    /// Point the branch at `handle` to `target`
    pub fn patch(&mut self, handle: PatchHandle, target: u32) -> EmitResult<()> {
        let disp = displacement(i64::from(target) - i64::from(handle.site) - 4)?;
        self.code.patch_s24(handle.field() as usize, disp)?;
        Ok(())
    }

    /// Point the branch at `handle` to the current address
    pub fn patch_here(&mut self, handle: PatchHandle) -> EmitResult<()> {
        let here = self.position();
        self.patch(handle, here)
    }

    /// Emit a `label` (a valid backward-branch target) and return its address
    pub fn label(&mut self, pool: &ConstantPool) -> EmitResult<u32> {
        self.emit(&Instruction::simple(SimpleOp::Label), pool)
    }

    /// Adjust the tracked stack depth without emitting code
    pub fn adjust_stack(&mut self, delta: i32) {
        if !self.depth.apply(delta, 0) {
            self.ordering_violation("stack underflow in depth adjustment");
        }
    }

    /// Remember the current stack depth
    pub fn push_depth(&mut self) {
        self.depth_stack.push(self.depth.stack);
    }

    /// Restore the most recently remembered stack depth
    pub fn pop_depth(&mut self) {
        match self.depth_stack.pop() {
            Some(depth) => self.depth.set_stack(depth),
            None => self.ordering_violation("depth stack is empty"),
        }
    }

    /// Allocate a temporary register
    pub fn alloc_temp(&mut self) -> Register {
        self.registers.alloc()
    }

    /// Release a temporary register
    pub fn free_temp(&mut self, register: Register) {
        if !self.registers.free(register) {
            self.ordering_violation(&format!("register {} released out of order", register.0));
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            depth: self.depth,
            scopes: self.scopes.clone(),
        }
    }

    /// Return to a snapshot; maxima reached in between are kept
    pub(crate) fn restore(&mut self, snapshot: Snapshot) {
        self.depth.stack = snapshot.depth.stack;
        self.depth.scope = snapshot.depth.scope;
        self.scopes = snapshot.scopes;
    }

    /// Report a recoverable ordering bug in the caller
    pub fn ordering_violation(&self, message: &str) {
        warn!(method = %self.name, "{message}");
        if self.strict_ordering {
            debug_assert!(false, "{message}");
        }
    }
}

fn displacement(value: i64) -> EmitResult<i32> {
    i32::try_from(value)
        .ok()
        .filter(|v| (avmc_bytecode::buffer::MIN_S24..=avmc_bytecode::buffer::MAX_S24).contains(v))
        .ok_or_else(|| avmc_bytecode::BytecodeError::BranchOutOfRange(value).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> MethodState {
        MethodState::new(&StartMethod::new("f"), &EmitterConfig::default())
    }

    #[test]
    fn test_register_allocator() {
        let mut alloc = RegisterAllocator::new(2);

        let r0 = alloc.alloc();
        let r1 = alloc.alloc();
        assert_eq!(r0.0, 2);
        assert_eq!(r1.0, 3);
        assert_eq!(alloc.max_used(), 4);

        assert!(alloc.free(r1));
        let r2 = alloc.alloc();
        assert_eq!(r2.0, 3); // Reuses freed register
        assert!(!alloc.free(r0)); // out of order
        assert_eq!(alloc.in_use(), 1);
    }

    #[test]
    fn test_first_free_register() {
        let start = StartMethod::new("f")
            .params(2)
            .arguments(ArgumentsMode::Rest)
            .locals(3)
            .temps(1);
        assert_eq!(start.first_free_register(), 8);
        assert_eq!(StartMethod::new("g").first_free_register(), 1);
    }

    #[test]
    fn test_depth_tracker_clamps() {
        let mut depth = DepthTracker::new(1);
        assert!(depth.apply(2, 1));
        assert_eq!((depth.max_stack, depth.max_scope), (2, 2));
        assert!(!depth.apply(-3, 0));
        assert_eq!(depth.stack, 0);
        assert_eq!(depth.max_stack, 2);
    }

    #[test]
    fn test_forward_patch_lands_on_target() {
        let pool = ConstantPool::new();
        let mut m = state();
        let handle = m.reserve_branch(BranchOp::Jump, &pool).unwrap();
        m.emit(&Instruction::simple(SimpleOp::Nop), &pool).unwrap();
        let target = m.position();
        m.patch(handle, target).unwrap();

        let disp = m.code.read_s24(handle.field() as usize).unwrap();
        assert_eq!(disp as u32, target - handle.site() - 4);
        assert_eq!(handle.field() + 3 + disp as u32, target);
    }

    #[test]
    fn test_backward_branch() {
        let pool = ConstantPool::new();
        let mut m = state();
        let top = m.label(&pool).unwrap();
        m.emit(&Instruction::simple(SimpleOp::PushTrue), &pool).unwrap();
        let site = m.position();
        m.branch_to(BranchOp::IfTrue, top, &pool).unwrap();
        let disp = m.code.read_s24(site as usize + 1).unwrap();
        assert_eq!(i64::from(site) + 4 + i64::from(disp), i64::from(top));
        assert_eq!(m.depth.stack, 0);
        assert_eq!(m.depth.max_stack, 1);
    }

    #[test]
    fn test_register_touch_raises_local_count() {
        let pool = ConstantPool::new();
        let mut m = state();
        assert_eq!(m.local_count(), 1);
        m.emit(
            &Instruction::Local {
                op: avmc_bytecode::LocalOp::SetLocal,
                register: Register(5),
            },
            &pool,
        )
        .unwrap();
        assert_eq!(m.local_count(), 6);
    }
}
