//! Source positions and branch coverage
//!
//! Position changes only mark state dirty. The `debugfile`/`debugline`
//! records are written lazily in front of the next real instruction, so a
//! run of position updates with no code in between costs nothing.

use serde::Serialize;

use avmc_bytecode::{CallNameOp, Instruction, Multiname, NameOp, Register};

use crate::emitter::Emitter;
use crate::error::EmitResult;
use crate::ops::int_instruction;

/// Current source position and what changed since it was last written
#[derive(Debug, Clone, Default)]
pub struct DebugState {
    file: Option<String>,
    line: u32,
    file_dirty: bool,
    line_dirty: bool,
    function_dirty: bool,
    branch_file_dirty: bool,
}

impl DebugState {
    /// Current file
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// Current line
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Switch to `file` at `line`
    pub fn set_position(&mut self, file: &str, line: u32) {
        if self.file.as_deref() != Some(file) {
            self.file = Some(file.to_string());
            self.file_dirty = true;
            self.branch_file_dirty = true;
        }
        self.set_line(line);
    }

    /// Move to `line` in the current file
    pub fn set_line(&mut self, line: u32) {
        if self.line != line {
            self.line = line;
            self.line_dirty = true;
        }
    }

    /// A new method body begins or the enclosing one resumes
    pub(crate) fn enter_function(&mut self) {
        self.function_dirty = true;
        self.line_dirty = true;
    }
}

/// One instrumented branch outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchPoint {
    /// Id passed to the coverage hook
    pub id: u32,
    /// Source file
    pub file: String,
    /// Source line
    pub line: u32,
    /// Records the taken side of the branch
    pub taken: bool,
}

/// Every branch point registered while emitting a compilation unit
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoverageMap {
    files: Vec<String>,
    points: Vec<BranchPoint>,
}

impl CoverageMap {
    /// Register a branch point and return its id
    pub fn record(&mut self, file: &str, line: u32, taken: bool) -> u32 {
        let id = self.points.len() as u32;
        self.points.push(BranchPoint {
            id,
            file: file.to_string(),
            line,
            taken,
        });
        id
    }

    /// Note a file that contains branch points
    pub fn add_file(&mut self, file: &str) {
        if !self.files.iter().any(|f| f == file) {
            self.files.push(file.to_string());
        }
    }

    /// Files with branch points, in first-seen order
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Registered branch points
    pub fn points(&self) -> &[BranchPoint] {
        &self.points
    }

    /// Number of branch points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no branch points were registered
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl Emitter {
    /// Set the source file and line for following instructions
    pub fn set_position(&mut self, file: &str, line: u32) {
        self.debug.set_position(file, line);
    }

    /// Set the source line for following instructions
    pub fn set_line(&mut self, line: u32) {
        self.debug.set_line(line);
    }

    /// Write pending position records
    pub(crate) fn flush_position(&mut self) -> EmitResult<()> {
        if !self.config.debug || !self.debug.line_dirty || self.methods.is_empty() {
            return Ok(());
        }
        // no position has been set yet
        if self.debug.file.is_none() && self.debug.line == 0 {
            return Ok(());
        }
        if self.debug.file_dirty || self.debug.function_dirty {
            if let Some(file) = self.debug.file.clone() {
                let name = self.assembler.pool.string(&file);
                self.emit_raw(&Instruction::DebugFile(name))?;
            }
        }
        self.emit_raw(&Instruction::DebugLine(self.debug.line))?;
        self.debug.file_dirty = false;
        self.debug.line_dirty = false;
        self.debug.function_dirty = false;
        Ok(())
    }

    /// Name `register` in the debugger
    ///
    /// Written only when debug records are enabled. The receiver register
    /// cannot be renamed.
    pub fn debug_register(&mut self, name: &str, register: Register) -> EmitResult<()> {
        if !self.config.debug {
            return Ok(());
        }
        let Some(slot) = register.0.checked_sub(1).and_then(|r| u8::try_from(r).ok()) else {
            self.current()?
                .ordering_violation(&format!("register {} cannot carry a debug name", register.0));
            return Ok(());
        };
        let name = self.assembler.pool.string(name);
        self.emit(Instruction::Debug {
            debug_type: 1,
            name,
            register: slot,
            extra: 0,
        })?;
        Ok(())
    }

    /// Emit a stack-neutral call to the coverage hook for one branch outcome
    pub(crate) fn coverage_record(&mut self, taken: bool) -> EmitResult<()> {
        let file = self.debug.file.clone().unwrap_or_default();
        if self.debug.branch_file_dirty {
            self.coverage.add_file(&file);
            self.debug.branch_file_dirty = false;
        }
        let line = self.debug.line;
        let id = self.coverage.record(&file, line, taken);

        let pool = &mut self.assembler.pool;
        let hook = pool.multiname(&Multiname::public(self.config.coverage_hook.as_str()));
        let file = pool.string(&file);
        let line = int_instruction(pool, line as i32);
        let id = int_instruction(pool, id as i32);

        self.emit_raw(&Instruction::Name {
            op: NameOp::FindPropStrict,
            name: hook,
        })?;
        self.emit_raw(&Instruction::PushString(file))?;
        self.emit_raw(&line)?;
        self.emit_raw(&id)?;
        self.emit_raw(&Instruction::CallName {
            op: CallNameOp::CallPropVoid,
            name: hook,
            arg_count: 3,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::StartMethod;
    use crate::config::EmitterConfig;
    use avmc_bytecode::SimpleOp;
    use avmc_bytecode::disasm::decode_code;

    fn ops(e: &Emitter) -> Vec<Instruction> {
        decode_code(e.current().unwrap().code())
            .unwrap()
            .into_iter()
            .map(|(_, i)| i)
            .collect()
    }

    #[test]
    fn test_no_line_before_any_position() {
        let mut e = Emitter::new(EmitterConfig::default().with_debug(true));
        e.start_method(StartMethod::new("f")).unwrap();
        e.simple(SimpleOp::Nop).unwrap();
        e.set_line(2);
        e.simple(SimpleOp::Nop).unwrap();
        assert_eq!(
            ops(&e),
            vec![
                Instruction::simple(SimpleOp::Nop),
                Instruction::DebugLine(2),
                Instruction::simple(SimpleOp::Nop),
            ]
        );
    }

    #[test]
    fn test_position_written_lazily() {
        let mut e = Emitter::new(EmitterConfig::default().with_debug(true));
        e.start_method(StartMethod::new("f")).unwrap();
        e.set_position("a.as", 3);
        e.set_line(4);
        e.simple(SimpleOp::Nop).unwrap();
        e.simple(SimpleOp::Nop).unwrap();
        e.set_line(5);
        e.simple(SimpleOp::Nop).unwrap();

        let file = e.pool().strings.find(&"a.as".to_string()).unwrap();
        assert_eq!(
            ops(&e),
            vec![
                Instruction::DebugFile(avmc_bytecode::StringIndex(file)),
                Instruction::DebugLine(4),
                Instruction::simple(SimpleOp::Nop),
                Instruction::simple(SimpleOp::Nop),
                Instruction::DebugLine(5),
                Instruction::simple(SimpleOp::Nop),
            ]
        );
    }

    #[test]
    fn test_no_records_without_debug() {
        let mut e = Emitter::new(EmitterConfig::default());
        e.start_method(StartMethod::new("f")).unwrap();
        e.set_position("a.as", 3);
        e.simple(SimpleOp::Nop).unwrap();
        e.debug_register("x", Register(1)).unwrap();
        assert_eq!(ops(&e), vec![Instruction::simple(SimpleOp::Nop)]);
    }

    #[test]
    fn test_debug_register_is_biased() {
        let mut e = Emitter::new(EmitterConfig::default().with_debug(true));
        e.start_method(StartMethod::new("f").params(1)).unwrap();
        e.debug_register("x", Register(1)).unwrap();
        let Instruction::Debug { register, .. } = ops(&e).last().cloned().unwrap() else {
            panic!("expected a debug record");
        };
        assert_eq!(register, 0);
    }

    #[test]
    fn test_coverage_record_is_stack_neutral() {
        let mut e = Emitter::new(EmitterConfig::default().with_coverage(true));
        e.start_method(StartMethod::new("f")).unwrap();
        e.set_position("b.as", 9);
        e.coverage_record(true).unwrap();
        let depth = e.current().unwrap().depth();
        assert_eq!(depth.stack, 0);
        assert_eq!(depth.max_stack, 4);
        assert_eq!(e.coverage.len(), 1);
        assert_eq!(e.coverage.points()[0].line, 9);
        assert_eq!(e.coverage.files(), &["b.as".to_string()]);
    }
}
