//! Type transfer functions.
//!
//! `compute` derives a node's type from the current types of its inputs. It
//! never edits the graph; rules that look past the immediate inputs register
//! a dependency so the node is revisited when the inspected node changes.

use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::operators::{ArithOp, BitwiseOp, CmpOp, ControlOp, MemoryOp, Operator};
use smallvec::SmallVec;
use son_core::types::{FloatType, IntType, Nil, StructType, Truth, Ty, TypeData};

impl Graph {
    /// Type of input `i`, BOTTOM when the slot is empty.
    #[inline]
    pub fn in_ty(&self, n: NodeId, i: usize) -> Ty {
        self.input(n, i).map_or(Ty::BOTTOM, |d| self.ty(d))
    }

    /// True if control input `i` is missing or known dead.
    pub(crate) fn ctrl_dead(&self, n: NodeId, i: usize) -> bool {
        match self.input(n, i) {
            Some(c) => self.ty(c) == Ty::XCONTROL,
            None => true,
        }
    }

    /// Compute the type of `n` from its inputs.
    pub fn compute(&mut self, n: NodeId) -> Ty {
        let op = self.op(n).clone();
        match op {
            Operator::Control(c) => self.compute_control(n, c),
            Operator::CProj(idx) => {
                let parent = self.in_ty(n, 0);
                match self.types.tuple_elem(parent, idx as usize) {
                    Ty::XCONTROL | Ty::TOP => Ty::XCONTROL,
                    _ => Ty::CONTROL,
                }
            }
            Operator::Call(_) => self.ctrl_ty(n),
            Operator::Constant(t) => t,
            Operator::Proj(idx) => {
                let parent = self.in_ty(n, 0);
                self.types.tuple_elem(parent, idx as usize)
            }
            Operator::Phi(declared) => self.compute_phi(n, declared),
            Operator::Cast(t) => {
                let x = self.in_ty(n, 1);
                self.types.join(x, t)
            }
            Operator::IntOp(op) => self.compute_int_op(n, op),
            Operator::FloatOp(op) => self.compute_float_op(n, op),
            Operator::Bitwise(op) => self.compute_bitwise(n, op),
            Operator::IntCmp(op) => self.compute_int_cmp(n, op),
            Operator::FloatCmp(op) => {
                let (a, b) = (self.in_ty(n, 1), self.in_ty(n, 2));
                match (self.types.as_float(a), self.types.as_float(b)) {
                    (Some(x), Some(y)) if x.is_high() || y.is_high() => Ty::INT_TOP,
                    (Some(x), Some(y)) => match (x.value(), y.value()) {
                        (Some(x), Some(y)) => self.bool_con(op.eval(x, y)),
                        _ => Ty::BOOL,
                    },
                    _ => Ty::BOOL,
                }
            }
            Operator::Not => self.compute_not(n),
            Operator::ToFloat => {
                let x = self.in_ty(n, 1);
                match self.types.as_int(x) {
                    Some(i) if i.is_high() => Ty::F64_TOP,
                    Some(i) => match i.value() {
                        Some(v) => self.types.float(v as f64),
                        None => Ty::F64,
                    },
                    None => Ty::F64,
                }
            }
            Operator::Memory(m) => self.compute_memory(n, &m),
            Operator::Scope => Ty::BOTTOM,
        }
    }

    fn ctrl_ty(&self, n: NodeId) -> Ty {
        if self.ctrl_dead(n, 0) {
            Ty::XCONTROL
        } else {
            Ty::CONTROL
        }
    }

    fn bool_con(&mut self, b: bool) -> Ty {
        if b {
            Ty::ONE
        } else {
            Ty::ZERO
        }
    }

    // =========================================================================
    // Control
    // =========================================================================

    fn compute_control(&mut self, n: NodeId, c: ControlOp) -> Ty {
        match c {
            ControlOp::Start => self.start_type(),
            ControlOp::Stop => Ty::BOTTOM,
            ControlOp::Region => {
                let live = (1..self.node(n).n_ins()).any(|i| !self.ctrl_dead(n, i));
                if live {
                    Ty::CONTROL
                } else {
                    Ty::XCONTROL
                }
            }
            // The entry alone decides: a back edge needs the loop to be live.
            ControlOp::Loop => {
                if self.ctrl_dead(n, 1) {
                    Ty::XCONTROL
                } else {
                    Ty::CONTROL
                }
            }
            ControlOp::If => self.compute_if(n),
            ControlOp::Never => {
                if self.ctrl_dead(n, 0) {
                    Ty::IF_NEITHER
                } else {
                    Ty::IF_BOTH
                }
            }
            ControlOp::Return => {
                let ctrl = self.ctrl_ty(n);
                let val = self.in_ty(n, 2);
                self.types.tuple(&[ctrl, val])
            }
            ControlOp::CallEnd => {
                let call = self.in_ty(n, 0);
                if call == Ty::CONTROL {
                    let ret = match self.input(n, 0).map(|c| self.op(c).clone()) {
                        Some(Operator::Call(target)) => target.ret,
                        _ => Ty::BOTTOM,
                    };
                    self.types.tuple(&[Ty::CONTROL, ret])
                } else {
                    self.types.tuple(&[Ty::XCONTROL, Ty::TOP])
                }
            }
        }
    }

    fn compute_if(&mut self, n: NodeId) -> Ty {
        if self.ctrl_dead(n, 0) {
            return Ty::IF_NEITHER;
        }
        let pred = self.in_ty(n, 1);
        match self.types.truthiness(pred) {
            Truth::Neither => Ty::IF_NEITHER,
            Truth::AlwaysTrue => Ty::IF_TRUE,
            Truth::AlwaysFalse => Ty::IF_FALSE,
            Truth::Unknown => match self.dominating_test(n) {
                Some(true) => Ty::IF_TRUE,
                Some(false) => Ty::IF_FALSE,
                None => Ty::IF_BOTH,
            },
        }
    }

    /// If a dominating If tests the same predicate, the arm `n` sits under.
    ///
    /// `Some(true)` when `n` is only reachable through the true arm.
    pub(crate) fn dominating_test(&mut self, n: NodeId) -> Option<bool> {
        let pred = self.input(n, 1)?;
        let mut prior = n;
        let mut dom = self.idom(n);
        while let Some(d) = dom {
            self.add_dep(d, n);
            if *self.op(d) == Operator::IF && self.input(d, 1) == Some(pred) {
                if let Operator::CProj(idx) = *self.op(prior) {
                    return Some(idx == 0);
                }
            }
            if d == prior {
                break;
            }
            prior = d;
            dom = self.idom(d);
        }
        None
    }

    // =========================================================================
    // Phi
    // =========================================================================

    /// A Phi in progress or with no live path reports its declared type or
    /// TOP; otherwise the meet of the values flowing along live paths, never
    /// below the declared type.
    fn compute_phi(&mut self, n: NodeId, declared: Ty) -> Ty {
        let Some(region) = self.input(n, 0) else {
            return declared;
        };
        if self.in_progress(region) {
            return declared;
        }
        let is_loop = self.op(region).is_loop();
        if self.ty(region) == Ty::XCONTROL {
            return Ty::TOP;
        }
        let mut t = Ty::TOP;
        for i in 1..self.node(n).n_ins() {
            if let Some(c) = self.input(region, i) {
                self.add_dep(c, n);
            }
            if self.ctrl_dead(region, i) {
                continue;
            }
            let Some(v) = self.input(n, i) else {
                return declared;
            };
            let vt = self.ty(v);
            t = self.types.meet(t, vt);
        }
        if is_loop {
            t = self.types.widen(t);
        }
        // A value outside the declared type is a type error reported later.
        if !self.types.isa(t, declared) {
            return declared;
        }
        t
    }

    // =========================================================================
    // Integer Arithmetic
    // =========================================================================

    fn int_inputs(&self, n: NodeId, arity: usize) -> Result<SmallVec<[IntType; 2]>, Ty> {
        let mut out = SmallVec::new();
        let mut high = false;
        for i in 1..=arity {
            let t = self.in_ty(n, i);
            if self.types.is_high(t) {
                high = true;
                continue;
            }
            match self.types.as_int(t) {
                Some(it) => out.push(it),
                None => return Err(Ty::INT_BOT),
            }
        }
        if high {
            Err(Ty::INT_TOP)
        } else {
            Ok(out)
        }
    }

    fn range(&mut self, lo: i128, hi: i128) -> Ty {
        if lo < i64::MIN as i128 || hi > i64::MAX as i128 {
            Ty::INT_BOT
        } else {
            self.types.int_range(lo as i64, hi as i64)
        }
    }

    fn compute_int_op(&mut self, n: NodeId, op: ArithOp) -> Ty {
        let arity = if op.is_unary() { 1 } else { 2 };
        let ins = match self.int_inputs(n, arity) {
            Ok(ins) => ins,
            Err(t) => return t,
        };
        let a = ins[0];
        match op {
            ArithOp::Neg => self.range(-(a.max as i128), -(a.min as i128)),
            ArithOp::Add => {
                let b = ins[1];
                self.range(a.min as i128 + b.min as i128, a.max as i128 + b.max as i128)
            }
            ArithOp::Sub => {
                let b = ins[1];
                self.range(a.min as i128 - b.max as i128, a.max as i128 - b.min as i128)
            }
            ArithOp::Mul => {
                let b = ins[1];
                let p = [
                    a.min as i128 * b.min as i128,
                    a.min as i128 * b.max as i128,
                    a.max as i128 * b.min as i128,
                    a.max as i128 * b.max as i128,
                ];
                let lo = p.iter().copied().min().unwrap_or(0);
                let hi = p.iter().copied().max().unwrap_or(0);
                self.range(lo, hi)
            }
            ArithOp::Div => match (a.value(), ins[1].value()) {
                (Some(_), Some(0)) => Ty::INT_BOT,
                (Some(x), Some(y)) => self.types.int(x.wrapping_div(y)),
                _ => Ty::INT_BOT,
            },
        }
    }

    fn compute_bitwise(&mut self, n: NodeId, op: BitwiseOp) -> Ty {
        let ins = match self.int_inputs(n, 2) {
            Ok(ins) => ins,
            Err(t) => return t,
        };
        let (a, b) = (ins[0], ins[1]);
        if let (Some(x), Some(y)) = (a.value(), b.value()) {
            let v = match op {
                BitwiseOp::And => x & y,
                BitwiseOp::Or => x | y,
                BitwiseOp::Xor => x ^ y,
                BitwiseOp::Shl => x.wrapping_shl((y & 63) as u32),
                BitwiseOp::Shr => ((x as u64) >> (y & 63)) as i64,
                BitwiseOp::Sar => x >> (y & 63),
            };
            return self.types.int(v);
        }
        match op {
            BitwiseOp::And => match (a.is_non_negative(), b.is_non_negative()) {
                (true, true) => self.types.int_range(0, a.max.min(b.max)),
                (true, false) => self.types.int_range(0, a.max),
                (false, true) => self.types.int_range(0, b.max),
                (false, false) => Ty::INT_BOT,
            },
            BitwiseOp::Or | BitwiseOp::Xor if a.is_non_negative() && b.is_non_negative() => {
                let mask = IntType::range(0, a.max.max(b.max)).mask();
                self.types.int_range(0, mask)
            }
            _ => Ty::INT_BOT,
        }
    }

    fn compute_int_cmp(&mut self, n: NodeId, op: CmpOp) -> Ty {
        let (ta, tb) = (self.in_ty(n, 1), self.in_ty(n, 2));
        if self.types.is_high(ta) || self.types.is_high(tb) {
            return Ty::INT_TOP;
        }
        match (self.types.get(ta).clone(), self.types.get(tb).clone()) {
            (TypeData::Int(a), TypeData::Int(b)) => {
                if let (Some(x), Some(y)) = (a.value(), b.value()) {
                    return self.bool_con(op.eval(x, y));
                }
                let known = match op {
                    CmpOp::Eq if a.max < b.min || b.max < a.min => Some(false),
                    CmpOp::Ne if a.max < b.min || b.max < a.min => Some(true),
                    CmpOp::Lt if a.max < b.min => Some(true),
                    CmpOp::Lt if a.min >= b.max => Some(false),
                    CmpOp::Le if a.max <= b.min => Some(true),
                    CmpOp::Le if a.min > b.max => Some(false),
                    _ => None,
                };
                match known {
                    Some(b) => self.bool_con(b),
                    None => Ty::BOOL,
                }
            }
            (TypeData::Ptr(a), TypeData::Ptr(b)) if matches!(op, CmpOp::Eq | CmpOp::Ne) => {
                let null_vs_obj = (ta == Ty::NULL && b.nil == Nil::NotNil)
                    || (tb == Ty::NULL && a.nil == Nil::NotNil);
                match (null_vs_obj, op) {
                    (true, CmpOp::Eq) => Ty::ZERO,
                    (true, _) => Ty::ONE,
                    _ => Ty::BOOL,
                }
            }
            _ => Ty::BOOL,
        }
    }

    fn compute_not(&mut self, n: NodeId) -> Ty {
        let t = self.in_ty(n, 1);
        match self.types.truthiness(t) {
            Truth::Neither => Ty::INT_TOP,
            Truth::AlwaysTrue => Ty::ZERO,
            Truth::AlwaysFalse => Ty::ONE,
            Truth::Unknown => Ty::BOOL,
        }
    }

    // =========================================================================
    // Float Arithmetic
    // =========================================================================

    fn compute_float_op(&mut self, n: NodeId, op: ArithOp) -> Ty {
        let arity = if op.is_unary() { 1 } else { 2 };
        let mut vals: SmallVec<[FloatType; 2]> = SmallVec::new();
        for i in 1..=arity {
            let t = self.in_ty(n, i);
            match self.types.as_float(t) {
                Some(f) if f.is_high() => return Ty::F64_TOP,
                Some(f) => vals.push(f),
                None if self.types.is_high(t) => return Ty::F64_TOP,
                None => return Ty::F64,
            }
        }
        let consts: SmallVec<[f64; 2]> = vals.iter().filter_map(|f| f.value()).collect();
        if consts.len() == arity {
            let v = match op {
                ArithOp::Neg => -consts[0],
                ArithOp::Add => consts[0] + consts[1],
                ArithOp::Sub => consts[0] - consts[1],
                ArithOp::Mul => consts[0] * consts[1],
                ArithOp::Div => consts[0] / consts[1],
            };
            return self.types.float(v);
        }
        if vals.iter().all(|f| f.is_f32()) {
            Ty::F32
        } else {
            Ty::F64
        }
    }

    // =========================================================================
    // Memory
    // =========================================================================

    fn compute_memory(&mut self, n: NodeId, op: &MemoryOp) -> Ty {
        match op {
            MemoryOp::Load(field) => {
                let ptr = self.in_ty(n, 2);
                if self.types.is_high(ptr) {
                    return Ty::TOP;
                }
                field.declared
            }
            MemoryOp::Store(field) => self.types.mem(field.alias, field.declared),
            MemoryOp::New(obj) => {
                let ctrl = self.ctrl_ty(n);
                let mut elems: SmallVec<[Ty; 8]> = SmallVec::new();
                elems.push(ctrl);
                let shape = match self.types.as_struct(*obj) {
                    Some(StructType::Named { name, fields }) => Some((
                        name.clone(),
                        fields
                            .iter()
                            .flat_map(|fs| fs.iter().map(|f| (f.alias, f.ty)))
                            .collect::<SmallVec<[(u32, Ty); 4]>>(),
                    )),
                    _ => None,
                };
                match shape {
                    Some((name, fields)) => {
                        // Pointers name their struct; the shape is looked up by name.
                        let target = self.types.struct_forward(name);
                        let ptr = self.types.ptr(target, false);
                        elems.push(ptr);
                        for (alias, ty) in fields {
                            let m = self.types.mem(alias, ty);
                            elems.push(m);
                        }
                    }
                    None => elems.push(Ty::PTR_NOT_NULL),
                }
                self.types.tuple(&elems)
            }
            MemoryOp::Merge => Ty::MEM_BOT,
        }
    }
}
