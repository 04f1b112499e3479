//! Semantic errors survive only on live paths; internal faults are kept apart.

mod common;

use common::init_logging;
use son_opt::config::OptConfig;
use son_opt::diagnostics::{render_error, SourceMap};
use son_opt::ir::builder::{ArithmeticBuilder, ControlBuilder, GraphBuilder, ObjectBuilder};
use son_opt::ir::Graph;
use son_opt::opt::compile;
use son_core::error::{SonError, EXIT_ERROR};
use son_core::span::Span;
use son_core::types::{Ty, TypeTable, ARRAY_LEN};

/// Builder over one nullable `S` argument, with `S { int v; }` declared.
fn nullable_arg(final_field: bool) -> GraphBuilder {
    let mut types = TypeTable::new();
    let fwd = types.struct_forward("S");
    let nullable = types.ptr(fwd, true);
    let mut b = GraphBuilder::with_graph(Graph::with_types(types, &[nullable, Ty::INT_BOT]));
    b.declare_struct("S", &[("v", Ty::INT_BOT, final_field)])
        .unwrap();
    b
}

fn compile_err(b: GraphBuilder) -> SonError {
    init_logging();
    let mut g = b.finish().unwrap();
    compile(&mut g, &OptConfig::default()).unwrap_err()
}

fn messages(err: &SonError) -> Vec<&str> {
    err.diagnostics().iter().map(|d| d.message.as_str()).collect()
}

#[test]
fn test_null_access_is_reported_with_span() {
    let mut b = nullable_arg(false);
    let v = b.field("S", "v").unwrap();
    let p = b.arg(0);
    b.at(Span::new(7, 10));
    let x = b.load(p, &v).unwrap();
    b.at(Span::DUMMY);
    b.return_value(x).unwrap();

    let err = compile_err(b);
    assert!(!err.is_internal());
    assert_eq!(err.exit_code(), EXIT_ERROR);
    assert_eq!(messages(&err), vec!["might be null accessing 'v'"]);
    assert_eq!(err.diagnostics()[0].span, Span::new(7, 10));

    let src = SourceMap::new("return p.v;", "prog.smp");
    let rendered = render_error(&src, &err);
    assert!(rendered.starts_with("error: might be null accessing 'v'"));
    assert!(rendered.ends_with("^^^"));
}

#[test]
fn test_null_check_clears_the_error() {
    // if (p) return p.v; return 0;
    let mut b = nullable_arg(false);
    let v = b.field("S", "v").unwrap();
    let p = b.arg(0);
    b.define("p", p).unwrap();
    let p = b.get("p").unwrap();
    b.begin_if(p).unwrap();
    let narrowed = b.get("p").unwrap();
    let x = b.load(narrowed, &v).unwrap();
    b.return_value(x).unwrap();
    b.end_if().unwrap();
    let zero = b.const_int(0);
    b.return_value(zero).unwrap();

    let mut g = b.finish().unwrap();
    assert!(compile(&mut g, &OptConfig::default()).is_ok());
}

#[test]
fn test_error_on_dead_path_folds_away() {
    // int r = 0; if (false) r = p.v; return r;
    let mut b = nullable_arg(false);
    let v = b.field("S", "v").unwrap();
    let zero = b.const_int(0);
    b.define("r", zero).unwrap();
    let f = b.const_bool(false);
    b.begin_if(f).unwrap();
    let p = b.arg(0);
    let x = b.load(p, &v).unwrap();
    b.assign("r", x).unwrap();
    b.end_if().unwrap();
    let r = b.get("r").unwrap();
    b.return_value(r).unwrap();

    let mut g = b.finish().unwrap();
    assert!(compile(&mut g, &OptConfig::default()).is_ok());
}

#[test]
fn test_final_field_write() {
    let mut b = nullable_arg(true);
    let v = b.field("S", "v").unwrap();
    let s = b.new_struct("S").unwrap();
    let a = b.arg(1);
    b.store(s, &v, a).unwrap();
    let zero = b.const_int(0);
    b.return_value(zero).unwrap();

    let err = compile_err(b);
    assert_eq!(messages(&err), vec!["cannot modify final field 'v'"]);
}

#[test]
fn test_store_of_wrong_type() {
    let mut b = nullable_arg(false);
    let v = b.field("S", "v").unwrap();
    let s = b.new_struct("S").unwrap();
    let half = b.const_float(0.5);
    b.store(s, &v, half).unwrap();
    let zero = b.const_int(0);
    b.return_value(zero).unwrap();

    let err = compile_err(b);
    let msgs = messages(&err);
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].starts_with("cannot store"), "{msgs:?}");
    assert!(msgs[0].ends_with("into field 'v' of type int"), "{msgs:?}");
}

#[test]
fn test_array_length_is_final() {
    let mut b = GraphBuilder::new(&[Ty::INT_BOT]);
    let n = b.arg(0);
    let a = b.new_array(Ty::INT_BOT, n).unwrap();
    let len = b.field("[int]", ARRAY_LEN).unwrap();
    let zero = b.const_int(0);
    b.store(a, &len, zero).unwrap();
    b.return_value(zero).unwrap();

    let err = compile_err(b);
    assert_eq!(messages(&err), vec!["cannot modify final field '#'"]);
}

#[test]
fn test_array_index_and_length_must_be_ints() {
    let mut b = GraphBuilder::new(&[Ty::INT_BOT]);
    let n = b.arg(0);
    let a = b.new_array(Ty::INT_BOT, n).unwrap();
    let half = b.const_float(0.5);
    b.array_store(a, Ty::INT_BOT, half, n).unwrap();
    b.new_array(Ty::F64, half).unwrap();
    let zero = b.const_int(0);
    b.return_value(zero).unwrap();

    let err = compile_err(b);
    let msgs = messages(&err);
    assert_eq!(msgs.len(), 2, "{msgs:?}");
    assert!(msgs.iter().any(|m| m.starts_with("cannot index an array with")), "{msgs:?}");
    assert!(
        msgs.iter().any(|m| m.starts_with("cannot allocate an array with length")),
        "{msgs:?}"
    );
}

#[test]
fn test_branch_type_mismatch() {
    // r = 1; if (a) r = 1.5; return r;
    let mut b = nullable_arg(false);
    let one = b.const_int(1);
    b.define("r", one).unwrap();
    let a = b.arg(1);
    b.begin_if(a).unwrap();
    let f = b.const_float(1.5);
    b.assign("r", f).unwrap();
    b.end_if().unwrap();
    let r = b.get("r").unwrap();
    b.return_value(r).unwrap();

    let err = compile_err(b);
    let msgs = messages(&err);
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].starts_with("type mismatch across branches"), "{msgs:?}");
}

#[test]
fn test_errors_come_in_node_order() {
    let mut b = nullable_arg(true);
    let v = b.field("S", "v").unwrap();
    let p = b.arg(0);
    let x = b.load(p, &v).unwrap();
    let s = b.new_struct("S").unwrap();
    b.store(s, &v, x).unwrap();
    b.return_value(x).unwrap();

    let err = compile_err(b);
    assert_eq!(
        messages(&err),
        vec!["might be null accessing 'v'", "cannot modify final field 'v'"]
    );
}

#[test]
fn test_unclosed_if_is_internal() {
    let mut b = GraphBuilder::new(&[Ty::INT_BOT]);
    let a = b.arg(0);
    b.begin_if(a).unwrap();
    let err = b.finish().unwrap_err();
    assert!(err.is_internal());
    assert_eq!(err.exit_code(), 120);
}
