//! Algebraic identities over integers.
//!
//! Commutative operators keep constants on the right so that value numbering
//! sees one canonical shape; add chains lean left so constants collect at the
//! top of the chain and fold.

use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::operators::{ArithOp, BitwiseOp, CmpOp, Operator};
use son_core::types::Ty;

impl Graph {
    fn is_add(&self, n: NodeId) -> bool {
        *self.op(n) == Operator::IntOp(ArithOp::Add)
    }

    fn const_value(&self, n: NodeId) -> Option<i64> {
        if self.is_con(n) {
            self.types.int_value(self.ty(n))
        } else {
            None
        }
    }

    pub(super) fn idealize_int_op(&mut self, n: NodeId, op: ArithOp) -> Option<NodeId> {
        let span = self.node(n).span;
        let lhs = self.input(n, 1)?;
        if op == ArithOp::Neg {
            // -(-x)
            if *self.op(lhs) == Operator::IntOp(ArithOp::Neg) {
                return self.input(lhs, 1);
            }
            return None;
        }
        let rhs = self.input(n, 2)?;
        let (cl, cr) = (self.const_value(lhs), self.const_value(rhs));

        match op {
            ArithOp::Add => {
                if cr == Some(0) {
                    return Some(lhs);
                }
                if cl == Some(0) {
                    return Some(rhs);
                }
                if lhs == rhs {
                    let two = self.con_int(2);
                    return Some(self.binary(Operator::IntOp(ArithOp::Mul), lhs, two, span));
                }
                if self.is_con(lhs) && !self.is_con(rhs) {
                    return Some(self.swap_operands(n));
                }
                // x + (y + z) => (x + y) + z
                if self.is_add(rhs) && !self.is_con(rhs) {
                    let (y, z) = (self.input(rhs, 1)?, self.input(rhs, 2)?);
                    let xy = self.binary(Operator::IntOp(ArithOp::Add), lhs, y, span);
                    return Some(self.binary(Operator::IntOp(ArithOp::Add), xy, z, span));
                }
                if self.is_add(lhs) {
                    let (x, c1) = (self.input(lhs, 1)?, self.input(lhs, 2)?);
                    if self.is_con(c1) {
                        let add = Operator::IntOp(ArithOp::Add);
                        // (x + c1) + c2 => x + (c1 + c2)
                        if self.is_con(rhs) {
                            let c = self.binary(add.clone(), c1, rhs, span);
                            return Some(self.binary(add, x, c, span));
                        }
                        // (x + c) + y => (x + y) + c
                        let xy = self.binary(add.clone(), x, rhs, span);
                        return Some(self.binary(add, xy, c1, span));
                    }
                }
                None
            }
            ArithOp::Sub => {
                if lhs == rhs {
                    return Some(self.con(Ty::ZERO));
                }
                if cr == Some(0) {
                    return Some(lhs);
                }
                None
            }
            ArithOp::Mul => {
                if cr == Some(1) {
                    return Some(lhs);
                }
                if cl == Some(1) {
                    return Some(rhs);
                }
                if self.is_con(lhs) && !self.is_con(rhs) {
                    return Some(self.swap_operands(n));
                }
                None
            }
            ArithOp::Div => (cr == Some(1)).then_some(lhs),
            ArithOp::Neg => None,
        }
    }

    pub(super) fn idealize_bitwise(&mut self, n: NodeId, op: BitwiseOp) -> Option<NodeId> {
        let lhs = self.input(n, 1)?;
        let rhs = self.input(n, 2)?;
        let cr = self.const_value(rhs);
        if cr.is_some() && cr == op.identity() {
            return Some(lhs);
        }
        if op == BitwiseOp::Xor && lhs == rhs {
            return Some(self.con(Ty::ZERO));
        }
        if matches!(op, BitwiseOp::And | BitwiseOp::Or) && lhs == rhs {
            return Some(lhs);
        }
        if op.is_commutative() && self.is_con(lhs) && !self.is_con(rhs) {
            return Some(self.swap_operands(n));
        }
        None
    }

    pub(super) fn idealize_int_cmp(&mut self, n: NodeId, op: CmpOp) -> Option<NodeId> {
        let lhs = self.input(n, 1)?;
        let rhs = self.input(n, 2)?;
        if lhs == rhs {
            let t = if op.reflexive() { Ty::ONE } else { Ty::ZERO };
            return Some(self.con(t));
        }
        if op.is_commutative() && self.is_con(lhs) && !self.is_con(rhs) {
            return Some(self.swap_operands(n));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::graph::Graph;
    use crate::ir::node::NodeId;
    use crate::ir::operators::{ArithOp, BitwiseOp, CmpOp, Operator};
    use son_core::span::Span;
    use son_core::types::Ty;

    fn arg(g: &mut Graph) -> NodeId {
        let start = g.start();
        let x = g.add_node(Operator::Proj(2), &[Some(start)], Span::DUMMY);
        let x = g.peephole(x);
        g.keep(x)
    }

    /// A constant shared by several folds; folding one must not free it.
    fn kept_con(g: &mut Graph, v: i64) -> NodeId {
        let c = g.con_int(v);
        g.keep(c)
    }

    fn bin(g: &mut Graph, op: Operator, a: NodeId, b: NodeId) -> NodeId {
        g.binary(op, a, b, Span::DUMMY)
    }

    const ADD: Operator = Operator::IntOp(ArithOp::Add);

    #[test]
    fn test_add_zero() {
        let mut g = Graph::new(&[Ty::INT_BOT]);
        let x = arg(&mut g);
        let zero = kept_con(&mut g, 0);
        assert_eq!(bin(&mut g, ADD, x, zero), x);
        assert!(!g.is_dead(zero));
        assert_eq!(bin(&mut g, ADD, zero, x), x);
    }

    #[test]
    fn test_constant_moves_right() {
        let mut g = Graph::new(&[Ty::INT_BOT]);
        let x = arg(&mut g);
        let three = g.con_int(3);
        let n = bin(&mut g, ADD, three, x);
        assert_eq!(g.input(n, 1), Some(x));
        assert_eq!(g.input(n, 2), Some(three));
    }

    #[test]
    fn test_add_self_is_mul() {
        let mut g = Graph::new(&[Ty::INT_BOT]);
        let x = arg(&mut g);
        let n = bin(&mut g, ADD, x, x);
        assert_eq!(g.op(n), &Operator::IntOp(ArithOp::Mul));
        assert_eq!(g.types.int_value(g.in_ty(n, 2)), Some(2));
    }

    #[test]
    fn test_add_constants_collect() {
        let mut g = Graph::new(&[Ty::INT_BOT]);
        let x = arg(&mut g);
        let one = g.con_int(1);
        let two = g.con_int(2);
        let a = bin(&mut g, ADD, x, one);
        let b = bin(&mut g, ADD, a, two);
        assert_eq!(g.input(b, 1), Some(x));
        assert_eq!(g.types.int_value(g.in_ty(b, 2)), Some(3));
    }

    #[test]
    fn test_sub_self_is_zero() {
        let mut g = Graph::new(&[Ty::INT_BOT]);
        let x = arg(&mut g);
        let n = bin(&mut g, Operator::IntOp(ArithOp::Sub), x, x);
        assert_eq!(g.ty(n), Ty::ZERO);
        assert!(g.op(n).is_constant());
    }

    #[test]
    fn test_double_negation() {
        let mut g = Graph::new(&[Ty::INT_BOT]);
        let x = arg(&mut g);
        let neg = g.add_node(Operator::IntOp(ArithOp::Neg), &[None, Some(x)], Span::DUMMY);
        let neg = g.peephole(neg);
        let neg2 = g.add_node(Operator::IntOp(ArithOp::Neg), &[None, Some(neg)], Span::DUMMY);
        assert_eq!(g.peephole(neg2), x);
    }

    #[test]
    fn test_bitwise_identities() {
        let mut g = Graph::new(&[Ty::INT_BOT]);
        let x = arg(&mut g);
        let m1 = kept_con(&mut g, -1);
        let zero = kept_con(&mut g, 0);
        assert_eq!(bin(&mut g, Operator::Bitwise(BitwiseOp::And), x, m1), x);
        assert_eq!(bin(&mut g, Operator::Bitwise(BitwiseOp::Or), x, zero), x);
        assert_eq!(bin(&mut g, Operator::Bitwise(BitwiseOp::Shl), x, zero), x);
        let xx = bin(&mut g, Operator::Bitwise(BitwiseOp::Xor), x, x);
        assert_eq!(g.ty(xx), Ty::ZERO);
    }

    #[test]
    fn test_reflexive_compare() {
        let mut g = Graph::new(&[Ty::INT_BOT]);
        let x = arg(&mut g);
        let eq = bin(&mut g, Operator::IntCmp(CmpOp::Eq), x, x);
        let lt = bin(&mut g, Operator::IntCmp(CmpOp::Lt), x, x);
        assert_eq!(g.ty(eq), Ty::ONE);
        assert_eq!(g.ty(lt), Ty::ZERO);
    }
}
