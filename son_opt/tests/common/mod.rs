//! Shared helpers for the integration suites.

#![allow(dead_code)]

use son_core::types::Ty;
use son_opt::ir::builder::{ArithmeticBuilder, ControlBuilder, GraphBuilder, ObjectBuilder};
use son_opt::ir::{CmpOp, Graph, NodeId, Operator};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The single Return feeding Stop.
pub fn the_return(g: &Graph) -> NodeId {
    let rets: Vec<NodeId> = g
        .inputs(g.stop())
        .iter()
        .flatten()
        .copied()
        .filter(|&r| g.op(r) == &Operator::RETURN)
        .collect();
    assert_eq!(rets.len(), 1, "expected exactly one Return");
    rets[0]
}

/// Value input of the single Return.
pub fn returned_value(g: &Graph) -> NodeId {
    let ret = the_return(g);
    g.input(ret, 2).expect("return has a value")
}

/// Live nodes reachable from Stop whose operator satisfies `pred`.
pub fn count(g: &Graph, pred: impl Fn(&Operator) -> bool) -> usize {
    g.reachable().into_iter().filter(|&n| pred(g.op(n))).count()
}

/// Order-independent summary of a graph: every reachable node's label and
/// type, sorted.
pub fn shape(g: &Graph) -> Vec<String> {
    let mut out: Vec<String> = g
        .reachable()
        .into_iter()
        .map(|n| format!("{}:{}", g.op(n).label(), g.types.str(g.ty(n))))
        .collect();
    out.sort();
    out
}

/// Counts inner iterations; the outer variable `s` is only changed inside
/// the inner loop, so its two Phis feed each other.
///
/// ```text
/// s = 0; i = 0;
/// while (i < n) {
///     j = 0;
///     while (j < m) {
///         if (j < 3) s = s + 2; else s = s + 1;   // with_if
///         s = s + 1;                              // otherwise
///         j = j + 1;
///     }
///     i = i + 1;
/// }
/// return s;
/// ```
pub fn nested_counter(with_if: bool) -> GraphBuilder {
    let mut b = GraphBuilder::new(&[Ty::INT_BOT, Ty::INT_BOT]);
    let zero = b.const_int(0);
    b.define("s", zero).unwrap();
    b.define("i", zero).unwrap();
    b.begin_loop().unwrap();
    let i = b.get("i").unwrap();
    let n = b.arg(0);
    let t = b.compare(CmpOp::Lt, i, n);
    b.loop_test(t).unwrap();

    let zero = b.const_int(0);
    b.define("j", zero).unwrap();
    b.begin_loop().unwrap();
    let j = b.get("j").unwrap();
    let m = b.arg(1);
    let t = b.compare(CmpOp::Lt, j, m);
    b.loop_test(t).unwrap();
    let s = b.get("s").unwrap();
    if with_if {
        let j = b.get("j").unwrap();
        let three = b.const_int(3);
        let small = b.compare(CmpOp::Lt, j, three);
        b.begin_if(small).unwrap();
        let two = b.const_int(2);
        let s2 = b.add(s, two);
        b.assign("s", s2).unwrap();
        b.else_branch().unwrap();
        let one = b.const_int(1);
        let s1 = b.add(s, one);
        b.assign("s", s1).unwrap();
        b.end_if().unwrap();
    } else {
        let one = b.const_int(1);
        let s1 = b.add(s, one);
        b.assign("s", s1).unwrap();
    }
    let j = b.get("j").unwrap();
    let one = b.const_int(1);
    let j = b.add(j, one);
    b.assign("j", j).unwrap();
    b.end_loop().unwrap();

    let i = b.get("i").unwrap();
    let one = b.const_int(1);
    let i = b.add(i, one);
    b.assign("i", i).unwrap();
    b.end_loop().unwrap();
    let s = b.get("s").unwrap();
    b.return_value(s).unwrap();
    b
}

/// Fills an array in a loop and reads the last element back.
///
/// ```text
/// int[] a = new int[n];
/// i = 0;
/// while (i < n) { a[i] = i * 2; i = i + 1; }
/// return a[n - 1] + a#;
/// ```
pub fn array_fill() -> GraphBuilder {
    let mut b = GraphBuilder::new(&[Ty::INT_BOT]);
    let n = b.arg(0);
    let a = b.new_array(Ty::INT_BOT, n).unwrap();
    b.define("a", a).unwrap();
    let zero = b.const_int(0);
    b.define("i", zero).unwrap();
    b.begin_loop().unwrap();
    let i = b.get("i").unwrap();
    let n = b.arg(0);
    let t = b.compare(CmpOp::Lt, i, n);
    b.loop_test(t).unwrap();
    let a = b.get("a").unwrap();
    let i = b.get("i").unwrap();
    let two = b.const_int(2);
    let v = b.mul(i, two);
    b.array_store(a, Ty::INT_BOT, i, v).unwrap();
    let i = b.get("i").unwrap();
    let one = b.const_int(1);
    let i = b.add(i, one);
    b.assign("i", i).unwrap();
    b.end_loop().unwrap();

    let a = b.get("a").unwrap();
    let n = b.arg(0);
    let one = b.const_int(1);
    let last = b.sub(n, one);
    let x = b.array_load(a, Ty::INT_BOT, last).unwrap();
    let len = b.array_len(a, Ty::INT_BOT).unwrap();
    let r = b.add(x, len);
    b.return_value(r).unwrap();
    b
}
