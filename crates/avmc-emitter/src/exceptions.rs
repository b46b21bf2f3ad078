//! Exception handler stack
//!
//! try/catch/finally regions nest strictly and are closed in reverse order.
//! Catch clauses append entries to the method's exception table. A finally
//! body is emitted once: every path that must run it pushes a small resume
//! index and jumps in, and the end of the body dispatches back on that index
//! with a `lookupswitch`. Exceptions escaping the try or its handlers reach
//! the body through a synthetic catch-all handler that rethrows afterwards.

use avmc_bytecode::{
    BranchOp, ExceptionEntry, Instruction, JumpOffset, Multiname, MultinameIndex, Register,
    SimpleOp,
};

use crate::codegen::{PatchHandle, Snapshot};
use crate::emitter::Emitter;
use crate::error::{EmitError, EmitResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    Try,
    Catches,
    Finally,
}

/// One open try/catch/finally region
#[derive(Debug)]
pub(crate) struct ExceptionBlock {
    state: BlockState,
    try_start: u32,
    try_end: u32,
    /// Depths and scopes at try entry
    entry: Snapshot,
    /// Loop frames open at try entry
    loop_depth: usize,
    has_finally: bool,
    /// Holds the resume index while the finally body runs
    selector: Option<Register>,
    skip: Option<PatchHandle>,
    handler_ends: Vec<PatchHandle>,
    clauses: usize,
    call_sites: Vec<PatchHandle>,
    resumes: Vec<u32>,
    done: Option<PatchHandle>,
}

impl ExceptionBlock {
    fn runs_finally(&self) -> bool {
        self.has_finally && self.state != BlockState::Finally
    }
}

impl Emitter {
    fn open_block(&mut self, expected: &[BlockState], what: &str) -> EmitResult<Option<usize>> {
        let method = self.current_mut()?;
        let Some(block) = method.handlers.last() else {
            method.ordering_violation(&format!("{what} without an open try"));
            return Ok(None);
        };
        if !expected.contains(&block.state) {
            let state = block.state;
            method.ordering_violation(&format!("{what} in state {state:?}"));
            return Ok(None);
        }
        Ok(Some(method.handlers.len() - 1))
    }

    /// Open a try region
    pub fn try_begin(&mut self, has_finally: bool) -> EmitResult<()> {
        self.flush_position()?;
        let method = self.current_mut()?;
        let selector = has_finally.then(|| method.alloc_temp());
        let try_start = method.position();
        let block = ExceptionBlock {
            state: BlockState::Try,
            try_start,
            try_end: try_start,
            entry: method.snapshot(),
            loop_depth: method.flow.loop_depth(),
            has_finally,
            selector,
            skip: None,
            handler_ends: Vec::new(),
            clauses: 0,
            call_sites: Vec::new(),
            resumes: Vec::new(),
            done: None,
        };
        method.handlers.push(block);
        Ok(())
    }

    /// End the protected range and jump over the handlers
    pub fn catch_clauses_begin(&mut self) -> EmitResult<()> {
        let Some(index) = self.open_block(&[BlockState::Try], "catch_clauses_begin")? else {
            return Ok(());
        };
        self.flush_position()?;
        let method = self.current_mut()?;
        let end = method.position();
        let block = &mut method.handlers[index];
        block.try_end = end;
        block.state = BlockState::Catches;
        let skip = self.reserve(BranchOp::Jump)?;
        self.current_mut()?.handlers[index].skip = Some(skip);
        Ok(())
    }

    /// Start a handler for `exc_type` (`None` catches everything)
    ///
    /// Returns the handler's position in the exception table, for `newcatch`.
    /// On entry the exception value is on the stack and the scopes live at
    /// try entry have been pushed again.
    pub fn catch_clause(
        &mut self,
        exc_type: Option<&Multiname>,
        var_name: Option<&Multiname>,
    ) -> EmitResult<usize> {
        let Some(index) = self.open_block(&[BlockState::Catches], "catch_clause")? else {
            return Ok(0);
        };
        if self.current()?.handlers[index].clauses > 0 {
            let end = self.reserve(BranchOp::Jump)?;
            self.current_mut()?.handlers[index].handler_ends.push(end);
        }
        let exc_type = exc_type.map_or(MultinameIndex::NONE, |n| self.multiname(n));
        let var_name = var_name.map_or(MultinameIndex::NONE, |n| self.multiname(n));

        self.flush_position()?;
        let method = self.current_mut()?;
        let target = method.position();
        let block = &mut method.handlers[index];
        block.clauses += 1;
        let entry = ExceptionEntry {
            from: block.try_start,
            to: block.try_end,
            target,
            exc_type,
            var_name,
        };
        method.exceptions.push(entry);
        let position = method.exceptions.len() - 1;

        self.enter_handler(index)?;
        Ok(position)
    }

    /// Close the catch handlers
    pub fn catch_clauses_end(&mut self) -> EmitResult<()> {
        let Some(index) = self.open_block(&[BlockState::Catches], "catch_clauses_end")? else {
            return Ok(());
        };
        let method = self.current_mut()?;
        let block = &mut method.handlers[index];
        let pending: Vec<_> = block
            .skip
            .take()
            .into_iter()
            .chain(block.handler_ends.drain(..))
            .collect();
        let entry = block.entry.clone();
        let has_finally = block.has_finally;
        for handle in pending {
            method.patch_here(handle)?;
        }
        method.restore(entry);
        if !has_finally {
            method.handlers.pop();
        }
        Ok(())
    }

    /// Start the finally body
    pub fn finally_clause_begin(&mut self) -> EmitResult<()> {
        let Some(index) = self.open_block(
            &[BlockState::Try, BlockState::Catches],
            "finally_clause_begin",
        )?
        else {
            return Ok(());
        };
        self.flush_position()?;
        let method = self.current_mut()?;
        let range_end = method.position();
        let block = &mut method.handlers[index];
        if !block.has_finally {
            method.ordering_violation("finally on a try declared without one");
            return Ok(());
        }
        if block.state == BlockState::Try {
            block.try_end = range_end;
        }
        let try_start = block.try_start;

        self.call_site(index)?;
        let done = self.reserve(BranchOp::Jump)?;

        let method = self.current_mut()?;
        let target = method.position();
        method.exceptions.push(ExceptionEntry {
            from: try_start,
            to: range_end,
            target,
            exc_type: MultinameIndex::NONE,
            var_name: MultinameIndex::NONE,
        });
        self.enter_handler(index)?;
        let exception = self.alloc_temp()?;
        self.set_local(exception)?;
        self.call_site(index)?;
        self.get_local(exception)?;
        self.free_temp(exception)?;
        self.throw()?;

        let method = self.current_mut()?;
        let block = &mut method.handlers[index];
        block.done = Some(done);
        block.state = BlockState::Finally;
        let call_sites = std::mem::take(&mut block.call_sites);
        let selector = block.selector;
        let entry = block.entry.clone();
        for handle in call_sites {
            method.patch_here(handle)?;
        }
        method.restore(entry);
        method.adjust_stack(1);
        if let Some(selector) = selector {
            self.set_local(selector)?;
        }
        Ok(())
    }

    /// End the finally body and return to the path that entered it
    pub fn finally_clause_end(&mut self) -> EmitResult<()> {
        let Some(index) = self.open_block(&[BlockState::Finally], "finally_clause_end")? else {
            return Ok(());
        };
        let block = &self.current()?.handlers[index];
        let resumes = block.resumes.clone();
        let done = block.done;
        let Some(selector) = block.selector else {
            return Err(EmitError::internal("finally block has no selector register"));
        };

        match resumes.as_slice() {
            [] => return Err(EmitError::internal("finally body has no resume points")),
            [only] => {
                self.kill(selector)?;
                self.branch_back(BranchOp::Jump, *only)?;
            }
            [first, ..] => {
                self.get_local(selector)?;
                self.kill(selector)?;
                self.dispatch(*first, &resumes)?;
            }
        }

        let method = self.current_mut()?;
        let Some(block) = method.handlers.pop() else {
            return Ok(());
        };
        if let Some(done) = done {
            method.patch_here(done)?;
        }
        method.free_temp(selector);
        method.restore(block.entry);
        Ok(())
    }

    /// `lookupswitch` to absolute addresses
    fn dispatch(&mut self, default: u32, cases: &[u32]) -> EmitResult<()> {
        self.flush_position()?;
        let site = self.current()?.position() as i32;
        let relative = |target: u32| JumpOffset(target as i32 - site);
        self.emit_raw(&Instruction::LookupSwitch {
            default: relative(default),
            cases: cases.iter().copied().map(relative).collect(),
        })?;
        Ok(())
    }

    /// Enter the finally of block `index` and come back here afterwards
    fn call_site(&mut self, index: usize) -> EmitResult<()> {
        let resume_index = self.current()?.handlers[index].resumes.len();
        self.push_int(resume_index as i32)?;
        let handle = self.reserve(BranchOp::Jump)?;
        self.current_mut()?.adjust_stack(-1);
        let resume = self.label()?;
        let block = &mut self.current_mut()?.handlers[index];
        block.call_sites.push(handle);
        block.resumes.push(resume);
        Ok(())
    }

    /// Handler entry: exception on the stack, try-entry scopes restored
    fn enter_handler(&mut self, index: usize) -> EmitResult<()> {
        let method = self.current_mut()?;
        let entry = method.handlers[index].entry.clone();
        let init = method.init_scope_depth;
        method.depth.set_stack(1);
        method.depth.scope = init;
        method.scopes.clear();
        for (depth, scope) in entry.scopes.iter().enumerate() {
            let Some(scope) = scope else {
                return Err(EmitError::internal(format!(
                    "scope {} live at try entry was not pushed from a register",
                    init as usize + depth
                )));
            };
            self.push_saved(scope.register, scope.with)?;
        }
        Ok(())
    }

    /// Pop scopes and run finally bodies of the blocks being left
    ///
    /// With a loop index, only blocks opened inside that loop are left.
    /// At most `limit` finally bodies are called. Returns how many were.
    pub(crate) fn unwind(&mut self, loop_index: Option<usize>, limit: usize) -> EmitResult<usize> {
        let mut called = 0;
        let count = self.current()?.handlers.len();
        for index in (0..count).rev() {
            if called >= limit {
                break;
            }
            let block = &self.current()?.handlers[index];
            if loop_index.is_some_and(|l| block.loop_depth <= l) {
                break;
            }
            let scope_depth = block.entry.depth.scope;
            let runs_finally = block.runs_finally();
            self.pop_scopes_to(scope_depth)?;
            if runs_finally {
                self.call_site(index)?;
                called += 1;
            }
        }
        Ok(called)
    }

    /// Run up to `limit` enclosing finally bodies, innermost first
    ///
    /// A `return` runs all of them; a rethrow that only needs the nearest
    /// passes 1. Scopes opened inside the exited blocks are popped.
    pub fn call_finallies(&mut self, limit: usize) -> EmitResult<usize> {
        self.unwind(None, limit)
    }

    fn has_pending_finally(&self) -> EmitResult<bool> {
        Ok(self.current()?.handlers.iter().any(ExceptionBlock::runs_finally))
    }

    /// Return the value on the stack, running enclosing finally bodies first
    pub fn return_value(&mut self) -> EmitResult<()> {
        if !self.has_pending_finally()? {
            return self.simple(SimpleOp::ReturnValue);
        }
        let saved = self.current()?.snapshot();
        let value = self.alloc_temp()?;
        self.set_local(value)?;
        self.unwind(None, usize::MAX)?;
        self.get_local(value)?;
        self.kill(value)?;
        self.simple(SimpleOp::ReturnValue)?;

        let method = self.current_mut()?;
        method.free_temp(value);
        method.restore(saved);
        method.adjust_stack(-1);
        Ok(())
    }

    /// Return from a void method, running enclosing finally bodies first
    pub fn return_void(&mut self) -> EmitResult<()> {
        if !self.has_pending_finally()? {
            return self.simple(SimpleOp::ReturnVoid);
        }
        let saved = self.current()?.snapshot();
        self.unwind(None, usize::MAX)?;
        self.simple(SimpleOp::ReturnVoid)?;
        self.current_mut()?.restore(saved);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::StartMethod;
    use crate::config::EmitterConfig;
    use avmc_bytecode::LocalOp;
    use avmc_bytecode::disasm::{branch_targets, decode_code};

    fn open() -> Emitter {
        let mut e = Emitter::new(EmitterConfig::default());
        e.start_method(StartMethod::new("f")).unwrap();
        e
    }

    fn listing(e: &Emitter) -> Vec<(u32, Instruction)> {
        decode_code(e.current().unwrap().code()).unwrap()
    }

    #[test]
    fn test_try_catch_entries() {
        let mut e = open();
        e.try_begin(false).unwrap();
        e.push_int(1).unwrap();
        e.pop().unwrap();
        e.catch_clauses_begin().unwrap();
        let first = e
            .catch_clause(Some(&Multiname::public("Error")), Some(&Multiname::public("e")))
            .unwrap();
        assert_eq!(e.current().unwrap().depth().stack, 1);
        e.pop().unwrap();
        let second = e.catch_clause(None, None).unwrap();
        e.pop().unwrap();
        e.catch_clauses_end().unwrap();
        e.return_void().unwrap();

        assert_eq!((first, second), (0, 1));
        let m = e.current().unwrap();
        assert!(m.handlers.is_empty());
        assert_eq!(m.depth().stack, 0);
        let [a, b] = m.exceptions.as_slice() else {
            panic!("expected two entries");
        };
        assert_eq!((a.from, a.to), (b.from, b.to));
        assert_ne!(a.target, b.target);
        assert_ne!(a.exc_type, MultinameIndex::NONE);
        assert_eq!(b.exc_type, MultinameIndex::NONE);

        // the skip jump and the first handler's end jump both land on returnvoid
        let code = listing(&e);
        let end = i64::from(code.last().unwrap().0);
        let jumps: Vec<_> = code
            .iter()
            .filter(|(_, i)| matches!(i, Instruction::Branch { .. }))
            .collect();
        assert_eq!(jumps.len(), 2);
        for (site, jump) in jumps {
            assert_eq!(branch_targets(*site, jump), vec![end]);
        }
    }

    #[test]
    fn test_finally_dispatch() {
        let mut e = open();
        e.try_begin(true).unwrap();
        e.simple(SimpleOp::Nop).unwrap();
        e.catch_clauses_begin().unwrap();
        e.catch_clause(Some(&Multiname::public("TypeError")), None).unwrap();
        e.pop().unwrap();
        e.catch_clause(Some(&Multiname::public("Error")), None).unwrap();
        e.pop().unwrap();
        e.catch_clauses_end().unwrap();
        e.finally_clause_begin().unwrap();
        assert_eq!(e.current().unwrap().depth().stack, 0);
        e.simple(SimpleOp::Nop).unwrap();
        e.finally_clause_end().unwrap();
        e.return_void().unwrap();

        let m = e.current().unwrap();
        assert!(m.handlers.is_empty());
        assert_eq!(m.depth().stack, 0);
        assert_eq!(m.registers.in_use(), 0);
        assert_eq!(m.exceptions.len(), 3);
        let catch_all = &m.exceptions[2];
        assert_eq!(catch_all.exc_type, MultinameIndex::NONE);
        assert_eq!(catch_all.from, m.exceptions[0].from);
        assert!(catch_all.to > m.exceptions[0].to);

        let code = listing(&e);
        let (site, switch) = code
            .iter()
            .find(|(_, i)| matches!(i, Instruction::LookupSwitch { .. }))
            .unwrap();
        let Instruction::LookupSwitch { cases, .. } = switch else {
            unreachable!();
        };
        // normal exit and the catch-all
        assert_eq!(cases.len(), 2);
        for target in branch_targets(*site, switch) {
            let (_, at) = code.iter().find(|(o, _)| i64::from(*o) == target).unwrap();
            assert_eq!(*at, Instruction::simple(SimpleOp::Label));
        }
    }

    #[test]
    fn test_break_through_finally() {
        let mut e = open();
        let l = e.loop_begin().unwrap();
        e.try_begin(true).unwrap();
        e.get_local(Register(0)).unwrap();
        e.push_scope().unwrap();
        e.break_loop(l).unwrap();
        e.pop_scope().unwrap();
        e.finally_clause_begin().unwrap();
        e.finally_clause_end().unwrap();
        e.patch_continue(l).unwrap();
        e.patch_loop_begin(l).unwrap();
        e.push_bool(true).unwrap();
        e.loop_back(l, BranchOp::IfTrue).unwrap();
        e.patch_break(l).unwrap();
        e.return_void().unwrap();

        let code = listing(&e);
        let ops: Vec<_> = code.iter().map(|(_, i)| i.clone()).collect();
        assert_eq!(ops[4], Instruction::simple(SimpleOp::PopScope));
        assert_eq!(ops[5], Instruction::PushByte(0));
        assert!(matches!(ops[6], Instruction::Branch { op: BranchOp::Jump, .. }));
        assert_eq!(ops[7], Instruction::simple(SimpleOp::Label));
        let end = i64::from(code.last().unwrap().0);
        assert_eq!(branch_targets(code[8].0, &code[8].1), vec![end]);

        let m = e.current().unwrap();
        assert_eq!(m.exceptions.len(), 1);
        assert_eq!(m.depth().stack, 0);
        assert_eq!(m.depth().scope, 0);
        let switch = ops
            .iter()
            .find_map(|i| match i {
                Instruction::LookupSwitch { cases, .. } => Some(cases.len()),
                _ => None,
            })
            .unwrap();
        // break, normal exit, catch-all
        assert_eq!(switch, 3);
    }

    #[test]
    fn test_return_value_through_finally() {
        let mut e = open();
        e.try_begin(true).unwrap();
        e.push_int(5).unwrap();
        e.return_value().unwrap();
        assert_eq!(e.current().unwrap().depth().stack, 0);
        e.finally_clause_begin().unwrap();
        e.finally_clause_end().unwrap();
        e.return_void().unwrap();

        let ops: Vec<_> = listing(&e).into_iter().map(|(_, i)| i).collect();
        assert_eq!(
            &ops[..3],
            &[
                Instruction::PushByte(5),
                Instruction::simple(SimpleOp::SetLocal2),
                Instruction::PushByte(0),
            ]
        );
        assert!(matches!(ops[3], Instruction::Branch { op: BranchOp::Jump, .. }));
        assert_eq!(
            &ops[4..8],
            &[
                Instruction::simple(SimpleOp::Label),
                Instruction::simple(SimpleOp::GetLocal2),
                Instruction::Local {
                    op: LocalOp::Kill,
                    register: Register(2),
                },
                Instruction::simple(SimpleOp::ReturnValue),
            ]
        );
        assert_eq!(e.current().unwrap().registers.in_use(), 0);
    }

    #[test]
    fn test_return_without_finally() {
        let mut e = open();
        e.push_int(1).unwrap();
        e.return_value().unwrap();
        let ops: Vec<_> = listing(&e).into_iter().map(|(_, i)| i).collect();
        assert_eq!(
            ops,
            vec![Instruction::PushByte(1), Instruction::simple(SimpleOp::ReturnValue)]
        );
    }

    #[test]
    fn test_handler_restores_saved_scopes() {
        let mut e = open();
        e.push_scope_saved(Register(0)).unwrap();
        e.try_begin(false).unwrap();
        e.simple(SimpleOp::Nop).unwrap();
        e.catch_clauses_begin().unwrap();
        e.catch_clause(None, None).unwrap();

        let depth = e.current().unwrap().depth();
        assert_eq!((depth.stack, depth.scope), (1, 1));
        let ops: Vec<_> = listing(&e).into_iter().map(|(_, i)| i).collect();
        assert_eq!(
            &ops[ops.len() - 2..],
            &[
                Instruction::simple(SimpleOp::GetLocal0),
                Instruction::simple(SimpleOp::PushScope),
            ]
        );
    }

    #[test]
    fn test_unsaved_scope_in_handler_is_internal() {
        let mut e = open();
        e.get_local(Register(0)).unwrap();
        e.push_scope().unwrap();
        e.try_begin(false).unwrap();
        e.catch_clauses_begin().unwrap();
        let err = e.catch_clause(None, None).unwrap_err();
        assert!(matches!(err, EmitError::Internal(_)));
    }

    #[test]
    fn test_misordered_calls_are_ignored() {
        let mut e = open();
        e.catch_clauses_begin().unwrap();
        e.finally_clause_end().unwrap();
        e.try_begin(false).unwrap();
        e.finally_clause_begin().unwrap();
        assert!(e.current().unwrap().code().is_empty());
    }
}
