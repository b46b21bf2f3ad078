//! Control-flow patcher
//!
//! Forward branches are emitted with a placeholder displacement and kept on
//! a pending stack until their target is known. Loops, labels and switches
//! share one frame stack so `break`/`continue` address them by index.

use avmc_bytecode::{BranchOp, Instruction, JumpOffset, SimpleOp};

use crate::codegen::{MethodState, PatchHandle};
use crate::emitter::Emitter;
use crate::error::EmitResult;

/// Pending branches of one method
#[derive(Debug, Default)]
pub(crate) struct FlowState {
    ifs: Vec<BranchFrame>,
    elses: Vec<BranchFrame>,
    loops: Vec<LoopFrame>,
}

impl FlowState {
    pub(crate) fn is_empty(&self) -> bool {
        self.ifs.is_empty() && self.elses.is_empty() && self.loops.is_empty()
    }

    /// Number of open loop, label and switch frames
    pub(crate) fn loop_depth(&self) -> usize {
        self.loops.len()
    }
}

#[derive(Debug, Clone, Copy)]
struct BranchFrame {
    handle: PatchHandle,
    /// Stack depth on the path that took the branch
    depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Loop,
    Label,
    Switch,
}

#[derive(Debug)]
struct LoopFrame {
    kind: FrameKind,
    entry: Option<PatchHandle>,
    top: Option<u32>,
    breaks: Vec<PatchHandle>,
    continues: Vec<PatchHandle>,
    stack_depth: u32,
    scope_depth: u32,
    cases: Vec<u32>,
    default: Option<u32>,
}

impl MethodState {
    fn frame(&mut self, index: usize) -> Option<&mut LoopFrame> {
        if index >= self.flow.loops.len() {
            self.ordering_violation(&format!("no loop, label or switch with index {index}"));
            return None;
        }
        Some(&mut self.flow.loops[index])
    }
}

impl Emitter {
    /// Emit a branch with a placeholder displacement
    pub(crate) fn reserve(&mut self, op: BranchOp) -> EmitResult<PatchHandle> {
        self.flush_position()?;
        let (pool, method) = self.split()?;
        method.reserve_branch(op, pool)
    }

    /// Emit a branch to a known address
    pub(crate) fn branch_back(&mut self, op: BranchOp, target: u32) -> EmitResult<()> {
        self.flush_position()?;
        let (pool, method) = self.split()?;
        method.branch_to(op, target, pool)
    }

    /// Point a pending branch at the current address
    pub(crate) fn patch_here(&mut self, handle: PatchHandle) -> EmitResult<()> {
        self.current_mut()?.patch_here(handle)
    }

    /// Emit a `label` and return its address
    pub(crate) fn label(&mut self) -> EmitResult<u32> {
        self.emit(Instruction::simple(SimpleOp::Label))
    }

    /// Conditional forward branch, with coverage records when enabled
    ///
    /// Returns the handle of the branch that must reach the original target.
    fn conditional(&mut self, op: BranchOp) -> EmitResult<PatchHandle> {
        if !self.config.coverage || op == BranchOp::Jump {
            return self.reserve(op);
        }
        let taken = self.reserve(op)?;
        self.coverage_record(false)?;
        let skip = self.reserve(BranchOp::Jump)?;
        self.patch_here(taken)?;
        self.label()?;
        self.coverage_record(true)?;
        let target = self.reserve(BranchOp::Jump)?;
        self.patch_here(skip)?;
        self.label()?;
        Ok(target)
    }

    /// Pop scopes until the scope depth is `depth`
    pub(crate) fn pop_scopes_to(&mut self, depth: u32) -> EmitResult<()> {
        while self.current()?.depth.scope > depth {
            self.pop_scope()?;
        }
        Ok(())
    }

    /// Remember the stack depth before a path that rejoins later
    pub fn push_depth(&mut self) -> EmitResult<()> {
        self.current_mut()?.push_depth();
        Ok(())
    }

    /// Return to the depth saved by `push_depth`
    pub fn pop_depth(&mut self) -> EmitResult<()> {
        self.current_mut()?.pop_depth();
        Ok(())
    }

    // If / else

    /// Branch over the following block when `op` is taken
    pub fn if_branch(&mut self, op: BranchOp) -> EmitResult<()> {
        let handle = self.conditional(op)?;
        let method = self.current_mut()?;
        let depth = method.depth.stack;
        method.flow.ifs.push(BranchFrame { handle, depth });
        Ok(())
    }

    /// End the then-block and start the else-block
    pub fn else_branch(&mut self) -> EmitResult<()> {
        let jump = self.reserve(BranchOp::Jump)?;
        let method = self.current_mut()?;
        let then_depth = method.depth.stack;
        let Some(frame) = method.flow.ifs.pop() else {
            method.ordering_violation("else without a pending if");
            return Ok(());
        };
        method.patch_here(frame.handle)?;
        method.depth.set_stack(frame.depth);
        method.flow.elses.push(BranchFrame {
            handle: jump,
            depth: then_depth,
        });
        Ok(())
    }

    /// Land the pending if-branch here
    pub fn patch_if(&mut self) -> EmitResult<()> {
        let method = self.current_mut()?;
        let Some(frame) = method.flow.ifs.pop() else {
            method.ordering_violation("patch_if without a pending if");
            return Ok(());
        };
        method.patch_here(frame.handle)?;
        reconcile(method, frame.depth);
        Ok(())
    }

    /// Land the pending else-jump here
    pub fn patch_else(&mut self) -> EmitResult<()> {
        let method = self.current_mut()?;
        let Some(frame) = method.flow.elses.pop() else {
            method.ordering_violation("patch_else without a pending else");
            return Ok(());
        };
        method.patch_here(frame.handle)?;
        reconcile(method, frame.depth);
        Ok(())
    }

    // Loops

    /// Open a loop whose condition is emitted after the body
    ///
    /// Emits the entry jump to the condition and the loop top label.
    pub fn loop_begin(&mut self) -> EmitResult<usize> {
        let entry = self.reserve(BranchOp::Jump)?;
        let top = self.label()?;
        self.push_frame(FrameKind::Loop, Some(entry), Some(top))
    }

    /// Open a loop entered at its top (`do ... while`)
    pub fn do_loop_begin(&mut self) -> EmitResult<usize> {
        let top = self.label()?;
        self.push_frame(FrameKind::Loop, None, Some(top))
    }

    /// Open a labeled block that `break` can leave
    pub fn label_begin(&mut self) -> EmitResult<usize> {
        self.push_frame(FrameKind::Label, None, None)
    }

    fn push_frame(
        &mut self,
        kind: FrameKind,
        entry: Option<PatchHandle>,
        top: Option<u32>,
    ) -> EmitResult<usize> {
        let method = self.current_mut()?;
        method.flow.loops.push(LoopFrame {
            kind,
            entry,
            top,
            breaks: Vec::new(),
            continues: Vec::new(),
            stack_depth: method.depth.stack,
            scope_depth: method.depth.scope,
            cases: Vec::new(),
            default: None,
        });
        Ok(method.flow.loops.len() - 1)
    }

    /// Land the loop's entry jump here (start of the condition)
    pub fn patch_loop_begin(&mut self, index: usize) -> EmitResult<()> {
        let method = self.current_mut()?;
        let Some(frame) = method.frame(index) else {
            return Ok(());
        };
        match frame.entry.take() {
            Some(entry) => method.patch_here(entry)?,
            None => method.ordering_violation("loop has no pending entry jump"),
        }
        Ok(())
    }

    /// Branch back to the loop top when `op` is taken
    pub fn loop_back(&mut self, index: usize, op: BranchOp) -> EmitResult<()> {
        let method = self.current_mut()?;
        let Some(top) = method.frame(index).map(|f| f.top) else {
            return Ok(());
        };
        let Some(top) = top else {
            method.ordering_violation("loop_back on a frame without a loop top");
            return Ok(());
        };
        if !self.config.coverage || op == BranchOp::Jump {
            return self.branch_back(op, top);
        }
        let taken = self.reserve(op)?;
        self.coverage_record(false)?;
        let skip = self.reserve(BranchOp::Jump)?;
        self.patch_here(taken)?;
        self.label()?;
        self.coverage_record(true)?;
        self.branch_back(BranchOp::Jump, top)?;
        self.patch_here(skip)?;
        self.label()?;
        Ok(())
    }

    /// Jump to the continue point of loop `index`
    pub fn continue_loop(&mut self, index: usize) -> EmitResult<()> {
        let method = self.current_mut()?;
        let Some(kind) = method.frame(index).map(|f| f.kind) else {
            return Ok(());
        };
        if kind != FrameKind::Loop {
            method.ordering_violation("continue targets a label or switch");
            return Ok(());
        }
        self.exit_to(index, false)
    }

    /// Jump to the exit of loop, label or switch `index`
    pub fn break_loop(&mut self, index: usize) -> EmitResult<()> {
        if self.current_mut()?.frame(index).is_none() {
            return Ok(());
        }
        self.exit_to(index, true)
    }

    /// Leave frame `index`, running intervening finally blocks first
    fn exit_to(&mut self, index: usize, is_break: bool) -> EmitResult<()> {
        let method = self.current()?;
        let scope_depth = method.flow.loops[index].scope_depth;
        let saved = method.snapshot();

        self.unwind(Some(index), usize::MAX)?;
        self.pop_scopes_to(scope_depth)?;
        let handle = self.reserve(BranchOp::Jump)?;

        let method = self.current_mut()?;
        let frame = &mut method.flow.loops[index];
        if is_break {
            frame.breaks.push(handle);
        } else {
            frame.continues.push(handle);
        }
        method.restore(saved);
        Ok(())
    }

    /// Land every pending continue of loop `index` here
    pub fn patch_continue(&mut self, index: usize) -> EmitResult<()> {
        let method = self.current_mut()?;
        let Some(frame) = method.frame(index) else {
            return Ok(());
        };
        let continues = std::mem::take(&mut frame.continues);
        for handle in continues {
            method.patch_here(handle)?;
        }
        Ok(())
    }

    /// Land every pending break of frame `index` here and close it
    pub fn patch_break(&mut self, index: usize) -> EmitResult<()> {
        let method = self.current_mut()?;
        if method.frame(index).is_none() {
            return Ok(());
        }
        if index + 1 != method.flow.loops.len() {
            method.ordering_violation("frame closed while inner frames are open");
        }
        method.flow.loops.truncate(index + 1);
        let Some(frame) = method.flow.loops.pop() else {
            return Ok(());
        };
        if frame.entry.is_some() {
            method.ordering_violation("loop closed with its entry jump unpatched");
        }
        if !frame.continues.is_empty() {
            method.ordering_violation(&format!(
                "loop closed with {} unpatched continue jumps",
                frame.continues.len()
            ));
        }
        // every reserved jump needs a target
        for handle in frame.breaks.into_iter().chain(frame.continues) {
            method.patch_here(handle)?;
        }
        method.depth.set_stack(frame.stack_depth);
        Ok(())
    }

    // Switch

    /// Open a switch: jump ahead to the dispatch code
    pub fn switch_begin(&mut self) -> EmitResult<usize> {
        let entry = self.reserve(BranchOp::Jump)?;
        self.push_frame(FrameKind::Switch, Some(entry), None)
    }

    /// Start the next case body
    pub fn case_label(&mut self, index: usize) -> EmitResult<()> {
        let Some(address) = self.switch_label(index)? else {
            return Ok(());
        };
        if let Some(frame) = self.current_mut()?.frame(index) {
            frame.cases.push(address);
        }
        Ok(())
    }

    /// Start the default body
    pub fn default_label(&mut self, index: usize) -> EmitResult<()> {
        let Some(address) = self.switch_label(index)? else {
            return Ok(());
        };
        if let Some(frame) = self.current_mut()?.frame(index) {
            frame.default = Some(address);
        }
        Ok(())
    }

    fn switch_label(&mut self, index: usize) -> EmitResult<Option<u32>> {
        let method = self.current_mut()?;
        let Some(depth) = method.frame(index).map(|f| f.stack_depth) else {
            return Ok(None);
        };
        method.depth.set_stack(depth);
        Ok(Some(self.label()?))
    }

    /// Land the switch entry jump here; the case index computation follows
    pub fn switch_table(&mut self, index: usize) -> EmitResult<()> {
        let method = self.current_mut()?;
        let Some(frame) = method.frame(index) else {
            return Ok(());
        };
        let (entry, depth) = (frame.entry.take(), frame.stack_depth);
        method.depth.set_stack(depth);
        match entry {
            Some(entry) => method.patch_here(entry)?,
            None => method.ordering_violation("switch table emitted twice"),
        }
        Ok(())
    }

    /// Dispatch on the case index on the stack
    ///
    /// Index `n` jumps to the `n`th case label; out-of-range values go to
    /// the default label, or past the dispatch when there is none.
    pub fn switch_dispatch(&mut self, index: usize) -> EmitResult<()> {
        self.flush_position()?;
        let method = self.current_mut()?;
        let site = method.position();
        let Some(frame) = method.frame(index) else {
            return Ok(());
        };
        let mut cases = frame.cases.clone();
        let default = frame.default;

        let placeholder = Instruction::LookupSwitch {
            default: JumpOffset::PLACEHOLDER,
            cases: vec![JumpOffset::PLACEHOLDER; cases.len().max(1)],
        };
        let end = site + placeholder.encoded_len() as u32;
        let default = default.unwrap_or(end);
        if cases.is_empty() {
            cases.push(default);
        }
        let relative = |target: u32| JumpOffset(target as i32 - site as i32);
        self.emit_raw(&Instruction::LookupSwitch {
            default: relative(default),
            cases: cases.into_iter().map(relative).collect(),
        })?;
        Ok(())
    }
}

/// Merge two paths meeting at a patched branch
fn reconcile(method: &mut MethodState, branch_depth: u32) {
    if method.depth.stack != branch_depth {
        method.ordering_violation(&format!(
            "paths meet with stack depths {} and {}",
            method.depth.stack, branch_depth
        ));
        method.depth.set_stack(method.depth.stack.max(branch_depth));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::StartMethod;
    use crate::config::EmitterConfig;
    use avmc_bytecode::disasm::{branch_targets, decode_code};

    fn open(config: EmitterConfig) -> Emitter {
        let mut e = Emitter::new(config);
        e.start_method(StartMethod::new("f").params(1)).unwrap();
        e
    }

    fn listing(e: &Emitter) -> Vec<(u32, Instruction)> {
        decode_code(e.current().unwrap().code()).unwrap()
    }

    #[test]
    fn test_if_else_targets() {
        let mut e = open(EmitterConfig::default());
        e.get_local(avmc_bytecode::Register(1)).unwrap();
        e.if_branch(BranchOp::IfFalse).unwrap();
        e.push_int(1).unwrap();
        e.else_branch().unwrap();
        e.push_int(2).unwrap();
        e.patch_else().unwrap();
        e.simple(SimpleOp::ReturnValue).unwrap();

        let code = listing(&e);
        // getlocal1, iffalse, pushbyte 1, jump, pushbyte 2, returnvalue
        let (if_site, if_instr) = &code[1];
        let (jump_site, jump_instr) = &code[3];
        assert_eq!(branch_targets(*if_site, if_instr), vec![i64::from(code[4].0)]);
        assert_eq!(branch_targets(*jump_site, jump_instr), vec![i64::from(code[5].0)]);
        let depth = e.current().unwrap().depth();
        assert_eq!(depth.stack, 0);
        assert_eq!(depth.max_stack, 1);
    }

    #[test]
    fn test_depth_stack_restores_conditional_value() {
        // cond ? 1 : 2 built with explicit depth saves
        let mut e = open(EmitterConfig::default());
        e.push_bool(true).unwrap();
        let skip = e.reserve(BranchOp::IfFalse).unwrap();
        e.push_depth().unwrap();
        e.push_int(1).unwrap();
        let done = e.reserve(BranchOp::Jump).unwrap();
        e.pop_depth().unwrap();
        e.patch_here(skip).unwrap();
        e.push_int(2).unwrap();
        e.patch_here(done).unwrap();
        assert_eq!(e.current().unwrap().depth().stack, 1);
    }

    #[test]
    fn test_while_loop_layout() {
        let mut e = open(EmitterConfig::default());
        let l = e.loop_begin().unwrap();
        e.break_loop(l).unwrap();
        e.patch_continue(l).unwrap();
        e.patch_loop_begin(l).unwrap();
        e.push_bool(true).unwrap();
        e.loop_back(l, BranchOp::IfTrue).unwrap();
        e.patch_break(l).unwrap();
        e.simple(SimpleOp::ReturnVoid).unwrap();

        let code = listing(&e);
        // jump cond, label, jump exit, pushtrue, iftrue top, returnvoid
        assert_eq!(code[1].1, Instruction::simple(SimpleOp::Label));
        assert_eq!(branch_targets(code[0].0, &code[0].1), vec![i64::from(code[3].0)]);
        assert_eq!(branch_targets(code[2].0, &code[2].1), vec![i64::from(code[5].0)]);
        assert_eq!(branch_targets(code[4].0, &code[4].1), vec![i64::from(code[1].0)]);
        assert!(e.current().unwrap().flow.is_empty());
    }

    #[test]
    fn test_unknown_loop_index_is_ignored() {
        let mut e = open(EmitterConfig::default());
        e.break_loop(3).unwrap();
        e.continue_loop(0).unwrap();
        e.patch_break(1).unwrap();
        assert!(e.current().unwrap().code().is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "unpatched continue")]
    fn test_unpatched_continue_is_reported() {
        let mut e = open(EmitterConfig::default().with_strict_ordering(true));
        let l = e.do_loop_begin().unwrap();
        e.continue_loop(l).unwrap();
        e.push_bool(false).unwrap();
        e.loop_back(l, BranchOp::IfTrue).unwrap();
        e.patch_break(l).unwrap();
    }

    #[test]
    fn test_unpatched_continue_still_lands() {
        let mut e = open(EmitterConfig::default());
        let l = e.do_loop_begin().unwrap();
        e.continue_loop(l).unwrap();
        e.push_bool(false).unwrap();
        e.loop_back(l, BranchOp::IfTrue).unwrap();
        e.patch_break(l).unwrap();
        e.simple(SimpleOp::ReturnVoid).unwrap();

        let code = listing(&e);
        let (site, jump) = code
            .iter()
            .find(|(_, i)| matches!(i, Instruction::Branch { op: BranchOp::Jump, .. }))
            .unwrap();
        let end = code.last().unwrap().0;
        assert_eq!(branch_targets(*site, jump), vec![i64::from(end)]);
    }

    #[test]
    fn test_break_pops_scopes() {
        let mut e = open(EmitterConfig::default());
        let l = e.label_begin().unwrap();
        e.get_local(avmc_bytecode::Register(0)).unwrap();
        e.push_scope().unwrap();
        e.break_loop(l).unwrap();
        assert_eq!(e.current().unwrap().depth().scope, 1);
        e.pop_scope().unwrap();
        e.patch_break(l).unwrap();

        let ops: Vec<_> = listing(&e).into_iter().map(|(_, i)| i).collect();
        assert_eq!(ops[2], Instruction::simple(SimpleOp::PopScope));
        assert!(matches!(ops[3], Instruction::Branch { op: BranchOp::Jump, .. }));
    }

    #[test]
    fn test_switch_dispatch() {
        let mut e = open(EmitterConfig::default());
        let s = e.switch_begin().unwrap();
        e.case_label(s).unwrap();
        e.break_loop(s).unwrap();
        e.case_label(s).unwrap();
        e.break_loop(s).unwrap();
        e.switch_table(s).unwrap();
        e.push_int(1).unwrap();
        e.switch_dispatch(s).unwrap();
        e.patch_break(s).unwrap();
        e.simple(SimpleOp::ReturnVoid).unwrap();

        let code = listing(&e);
        let (site, switch) = code
            .iter()
            .find(|(_, i)| matches!(i, Instruction::LookupSwitch { .. }))
            .unwrap();
        let targets = branch_targets(*site, switch);
        let end = code.last().unwrap().0;
        // default falls through past the dispatch, cases hit their labels
        assert_eq!(targets[0], i64::from(end));
        assert_eq!(targets[1], i64::from(code[1].0));
        assert_eq!(targets[2], i64::from(code[3].0));
        assert_eq!(e.current().unwrap().depth().stack, 0);
    }

    #[test]
    fn test_coverage_keeps_depth() {
        let mut plain = open(EmitterConfig::default());
        let mut covered = open(EmitterConfig::default().with_coverage(true));
        for e in [&mut plain, &mut covered] {
            e.set_position("t.as", 1);
            e.push_bool(true).unwrap();
            e.if_branch(BranchOp::IfFalse).unwrap();
            e.push_int(1).unwrap();
            e.pop().unwrap();
            e.patch_if().unwrap();
            e.simple(SimpleOp::ReturnVoid).unwrap();
        }
        assert_eq!(plain.current().unwrap().depth().stack, 0);
        assert_eq!(covered.current().unwrap().depth().stack, 0);
        assert_eq!(covered.coverage.len(), 2);
        assert!(covered.current().unwrap().code().len() > plain.current().unwrap().code().len());
    }
}
