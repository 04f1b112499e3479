use super::GraphBuilder;
use crate::ir::node::NodeId;
use crate::ir::operators::{ArithOp, BitwiseOp, CmpOp, Operator};
use son_core::types::Ty;

/// Builder trait for constants and value arithmetic.
///
/// Arithmetic and comparisons pick the integer or float form from the
/// operand types; a mixed pair converts its integer side first.
pub trait ArithmeticBuilder {
    // Constants
    fn const_int(&mut self, value: i64) -> NodeId;
    fn const_float(&mut self, value: f64) -> NodeId;
    fn const_bool(&mut self, value: bool) -> NodeId;
    fn const_null(&mut self) -> NodeId;

    // Arithmetic
    fn arith(&mut self, op: ArithOp, lhs: NodeId, rhs: NodeId) -> NodeId;
    fn add(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId;
    fn sub(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId;
    fn mul(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId;
    fn div(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId;
    fn neg(&mut self, value: NodeId) -> NodeId;
    fn bitwise(&mut self, op: BitwiseOp, lhs: NodeId, rhs: NodeId) -> NodeId;
    fn to_float(&mut self, value: NodeId) -> NodeId;

    // Comparison
    fn compare(&mut self, op: CmpOp, lhs: NodeId, rhs: NodeId) -> NodeId;
    fn gt(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId;
    fn ge(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId;
    fn not(&mut self, value: NodeId) -> NodeId;
}

impl GraphBuilder {
    fn is_float(&self, n: NodeId) -> bool {
        let t = self.graph.ty(n);
        self.graph.types.is_float(t)
    }

    /// Operands converted to a common numeric kind; true if that is float.
    fn promote(&mut self, lhs: NodeId, rhs: NodeId) -> (NodeId, NodeId, bool) {
        match (self.is_float(lhs), self.is_float(rhs)) {
            (false, false) => (lhs, rhs, false),
            (true, true) => (lhs, rhs, true),
            (true, false) => {
                let rhs = self.to_float(rhs);
                (lhs, rhs, true)
            }
            (false, true) => {
                let lhs = self.to_float(lhs);
                (lhs, rhs, true)
            }
        }
    }
}

impl ArithmeticBuilder for GraphBuilder {
    fn const_int(&mut self, value: i64) -> NodeId {
        self.graph.con_int(value)
    }

    fn const_float(&mut self, value: f64) -> NodeId {
        let t = self.graph.types.float(value);
        self.graph.con(t)
    }

    fn const_bool(&mut self, value: bool) -> NodeId {
        self.graph.con(if value { Ty::ONE } else { Ty::ZERO })
    }

    fn const_null(&mut self) -> NodeId {
        self.graph.con(Ty::NULL)
    }

    fn arith(&mut self, op: ArithOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        let (lhs, rhs, float) = self.promote(lhs, rhs);
        let op = if float {
            Operator::FloatOp(op)
        } else {
            Operator::IntOp(op)
        };
        self.emit(op, &[None, Some(lhs), Some(rhs)])
    }

    fn add(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.arith(ArithOp::Add, lhs, rhs)
    }

    fn sub(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.arith(ArithOp::Sub, lhs, rhs)
    }

    fn mul(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.arith(ArithOp::Mul, lhs, rhs)
    }

    fn div(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.arith(ArithOp::Div, lhs, rhs)
    }

    fn neg(&mut self, value: NodeId) -> NodeId {
        let op = if self.is_float(value) {
            Operator::FloatOp(ArithOp::Neg)
        } else {
            Operator::IntOp(ArithOp::Neg)
        };
        self.emit(op, &[None, Some(value)])
    }

    fn bitwise(&mut self, op: BitwiseOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.emit(Operator::Bitwise(op), &[None, Some(lhs), Some(rhs)])
    }

    fn to_float(&mut self, value: NodeId) -> NodeId {
        self.emit(Operator::ToFloat, &[None, Some(value)])
    }

    fn compare(&mut self, op: CmpOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        let (lhs, rhs, float) = self.promote(lhs, rhs);
        let op = if float {
            Operator::FloatCmp(op)
        } else {
            Operator::IntCmp(op)
        };
        self.emit(op, &[None, Some(lhs), Some(rhs)])
    }

    fn gt(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.compare(CmpOp::Lt, rhs, lhs)
    }

    fn ge(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.compare(CmpOp::Le, rhs, lhs)
    }

    fn not(&mut self, value: NodeId) -> NodeId {
        self.emit(Operator::Not, &[None, Some(value)])
    }
}
