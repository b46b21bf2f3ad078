//! End-to-end emission tests
//!
//! Each test drives the public call protocol, serializes the module and
//! reads it back before checking the result.

use avmc_bytecode::disasm::{branch_targets, decode_code};
use avmc_bytecode::{
    AbcModule, BranchOp, Instruction, MethodIndex, Multiname, MultinameIndex, Register, SimpleOp,
};
use avmc_emitter::{BinaryOperator, Emitter, EmitterConfig, FinishMethod, StartMethod};

fn round_trip(e: Emitter) -> AbcModule {
    let emitted = e.finish().unwrap();
    let bytes = emitted.to_bytes().unwrap();
    AbcModule::from_bytes(&bytes).unwrap()
}

fn listing(module: &AbcModule, body: usize) -> Vec<(u32, Instruction)> {
    decode_code(&module.bodies[body].code).unwrap()
}

#[test]
fn test_empty_method() {
    let mut e = Emitter::new(EmitterConfig::default());
    e.start_method(StartMethod::new("f")).unwrap();
    e.return_void().unwrap();
    e.finish_method(FinishMethod::default()).unwrap();

    let module = round_trip(e);
    assert_eq!(module.major_version, 46);
    assert_eq!(module.minor_version, 16);
    let body = &module.bodies[0];
    assert_eq!(body.max_stack, 0);
    assert_eq!(body.local_count, 1);
    assert!(body.exceptions.is_empty());
    assert!(body.traits.is_empty());
}

#[test]
fn test_simple_arithmetic() {
    let mut e = Emitter::new(EmitterConfig::default());
    e.start_method(StartMethod::new("f")).unwrap();
    e.push_int(2).unwrap();
    e.push_int(3).unwrap();
    e.binary(BinaryOperator::Add).unwrap();
    assert_eq!(e.current().unwrap().depth().stack, 1);
    e.return_value().unwrap();
    e.finish_method(FinishMethod::default()).unwrap();

    let module = round_trip(e);
    assert_eq!(module.bodies[0].max_stack, 2);
    // small values use immediate pushes
    assert!(module.constants.ints.is_empty());
    let ops: Vec<_> = listing(&module, 0).into_iter().map(|(_, i)| i).collect();
    assert_eq!(
        ops,
        vec![
            Instruction::PushByte(2),
            Instruction::PushByte(3),
            Instruction::simple(SimpleOp::Add),
            Instruction::simple(SimpleOp::ReturnValue),
        ]
    );
}

#[test]
fn test_large_ints_use_the_pool() {
    let mut e = Emitter::new(EmitterConfig::default());
    e.start_method(StartMethod::new("f")).unwrap();
    e.push_int(100_000).unwrap();
    e.push_int(200_000).unwrap();
    e.binary(BinaryOperator::Add).unwrap();
    e.push_int(100_000).unwrap();
    e.binary(BinaryOperator::Add).unwrap();
    e.return_value().unwrap();
    e.finish_method(FinishMethod::default()).unwrap();

    let module = round_trip(e);
    let ints = &module.constants.ints;
    assert_eq!(ints.len(), 2);
    assert_eq!(ints.find(&100_000), Some(1));
    assert_eq!(ints.find(&200_000), Some(2));
}

#[test]
fn test_break_out_of_try_finally_in_loop() {
    let mut e = Emitter::new(EmitterConfig::default());
    e.start_method(StartMethod::new("f").locals(1)).unwrap();
    let scope = Register(1);
    e.push_scope_saved(Register(0)).unwrap();

    let l = e.loop_begin().unwrap();
    e.try_begin(true).unwrap();
    e.new_object(0).unwrap();
    e.set_local(scope).unwrap();
    e.push_with_saved(scope).unwrap();
    e.break_loop(l).unwrap();
    e.pop_scope().unwrap();
    e.finally_clause_begin().unwrap();
    e.simple(SimpleOp::Nop).unwrap();
    e.finally_clause_end().unwrap();
    e.patch_continue(l).unwrap();
    e.patch_loop_begin(l).unwrap();
    e.push_bool(true).unwrap();
    e.loop_back(l, BranchOp::IfTrue).unwrap();
    e.patch_break(l).unwrap();
    e.pop_scope().unwrap();
    e.return_void().unwrap();
    e.finish_method(FinishMethod::default()).unwrap();

    let module = round_trip(e);
    let code = listing(&module, 0);
    let break_at = code
        .iter()
        .position(|(_, i)| *i == Instruction::simple(SimpleOp::PushWith))
        .unwrap()
        + 1;
    // one scope pop, one finally call, one jump to the loop exit
    assert_eq!(code[break_at].1, Instruction::simple(SimpleOp::PopScope));
    assert_eq!(code[break_at + 1].1, Instruction::PushByte(0));
    assert!(matches!(code[break_at + 2].1, Instruction::Branch { op: BranchOp::Jump, .. }));
    assert_eq!(code[break_at + 3].1, Instruction::simple(SimpleOp::Label));
    let (site, exit) = &code[break_at + 4];
    let exit_target = branch_targets(*site, exit)[0];
    let (_, landing) = code.iter().find(|(o, _)| i64::from(*o) == exit_target).unwrap();
    assert_eq!(*landing, Instruction::simple(SimpleOp::PopScope));

    let body = &module.bodies[0];
    assert_eq!(body.exceptions.len(), 1);
    assert_eq!(body.max_scope_depth, 2);
}

#[test]
fn test_exception_table_shape() {
    let mut e = Emitter::new(EmitterConfig::default());
    e.start_method(StartMethod::new("f")).unwrap();
    e.try_begin(true).unwrap();
    e.find_prop_strict(&Multiname::public("work")).unwrap();
    e.call_prop_void(&Multiname::public("work"), 0).unwrap();
    e.catch_clauses_begin().unwrap();
    e.catch_clause(Some(&Multiname::public("RangeError")), Some(&Multiname::public("e")))
        .unwrap();
    e.pop().unwrap();
    e.catch_clause(Some(&Multiname::public("Error")), Some(&Multiname::public("e")))
        .unwrap();
    e.pop().unwrap();
    e.catch_clauses_end().unwrap();
    e.finally_clause_begin().unwrap();
    e.simple(SimpleOp::Nop).unwrap();
    e.finally_clause_end().unwrap();
    e.return_void().unwrap();
    e.finish_method(FinishMethod::default()).unwrap();

    let module = round_trip(e);
    let body = &module.bodies[0];
    let typed: Vec<_> = body
        .exceptions
        .iter()
        .filter(|x| x.exc_type != MultinameIndex::NONE)
        .collect();
    assert_eq!(typed.len(), 2);
    assert_eq!((typed[0].from, typed[0].to), (typed[1].from, typed[1].to));
    assert_ne!(typed[0].target, typed[1].target);

    let switches: Vec<_> = listing(&module, 0)
        .into_iter()
        .filter_map(|(_, i)| match i {
            Instruction::LookupSwitch { cases, .. } => Some(cases.len()),
            _ => None,
        })
        .collect();
    // fallthrough and the rethrow path
    assert_eq!(switches, vec![2]);
}

#[test]
fn test_coverage_is_stack_neutral() {
    fn compile(config: EmitterConfig) -> (AbcModule, usize) {
        let mut e = Emitter::new(config);
        e.start_method(StartMethod::new("f").params(1)).unwrap();
        e.set_position("main.as", 10);
        let l = e.do_loop_begin().unwrap();
        e.inc_local_i(Register(1)).unwrap();
        e.patch_continue(l).unwrap();
        e.set_line(11);
        e.get_local(Register(1)).unwrap();
        e.push_int(10).unwrap();
        e.loop_back(l, BranchOp::IfLt).unwrap();
        e.patch_break(l).unwrap();
        e.set_line(12);
        e.get_local(Register(1)).unwrap();
        e.if_branch(BranchOp::IfFalse).unwrap();
        e.push_int(1).unwrap();
        e.return_value().unwrap();
        e.patch_if().unwrap();
        assert_eq!(e.current().unwrap().depth().stack, 0);
        e.return_void().unwrap();
        e.finish_method(FinishMethod::default()).unwrap();
        let emitted = e.finish().unwrap();
        let points = emitted.coverage.len();
        let bytes = emitted.to_bytes().unwrap();
        (AbcModule::from_bytes(&bytes).unwrap(), points)
    }

    let (plain, none) = compile(EmitterConfig::default());
    let (covered, points) = compile(EmitterConfig::default().with_coverage(true));
    assert_eq!(none, 0);
    assert_eq!(points, 4);
    assert!(covered.bodies[0].code.len() > plain.bodies[0].code.len());
    // every branch still decodes to an instruction boundary
    let code = listing(&covered, 0);
    for (site, instruction) in &code {
        for target in branch_targets(*site, instruction) {
            assert!(code.iter().any(|(o, _)| i64::from(*o) == target));
        }
    }
}

#[test]
fn test_debug_records() {
    let mut e = Emitter::new(EmitterConfig::default().with_debug(true));
    e.start_method(StartMethod::new("f").params(1).debug_name("f"))
        .unwrap();
    e.set_position("a.as", 1);
    e.debug_register("x", Register(1)).unwrap();
    e.return_void().unwrap();
    e.finish_method(FinishMethod::default()).unwrap();

    let module = round_trip(e);
    let ops: Vec<_> = listing(&module, 0).into_iter().map(|(_, i)| i).collect();
    assert!(matches!(ops[0], Instruction::DebugFile(_)));
    assert_eq!(ops[1], Instruction::DebugLine(1));
    assert!(matches!(ops[2], Instruction::Debug { register: 0, .. }));
    assert_eq!(module.method_name(MethodIndex(0)), "f");
}

#[test]
fn test_param_names_read_back() {
    let mut e = Emitter::new(EmitterConfig::default());
    e.start_method(StartMethod::new("f").params(2)).unwrap();
    e.return_void().unwrap();
    e.finish_method(FinishMethod {
        param_names: vec!["x".into(), "y".into()],
        ..Default::default()
    })
    .unwrap();
    e.start_method(StartMethod::new("g")).unwrap();
    e.return_void().unwrap();
    e.finish_method(FinishMethod::default()).unwrap();

    let module = round_trip(e);
    assert_eq!(module.methods.len(), 2);
    assert_eq!(module.bodies.len(), 2);
    let names: Vec<_> = module.methods[0]
        .param_names
        .iter()
        .map(|n| module.constants.get_string(*n))
        .collect();
    assert_eq!(names, vec![Some("x"), Some("y")]);
    assert!(module.methods[1].param_names.is_empty());
}
