use super::{Frame, GraphBuilder, IfFrame, LoopFrame};
use crate::ir::node::NodeId;
use crate::ir::operators::{CallTarget, Operator};
use son_core::error::{Phase, SonError, SonResult};
use son_core::types::{Nil, Ty};

/// Builder trait for structured control flow.
///
/// Statements nest: every `begin_if` is closed by `end_if` (with at most
/// one `else_branch` between), every `begin_loop` by `end_loop`.
pub trait ControlBuilder {
    // Conditionals
    fn begin_if(&mut self, pred: NodeId) -> SonResult<()>;
    fn else_branch(&mut self) -> SonResult<()>;
    fn end_if(&mut self) -> SonResult<()>;

    // Loops
    fn begin_loop(&mut self) -> SonResult<()>;
    fn loop_test(&mut self, pred: NodeId) -> SonResult<()>;
    fn end_loop(&mut self) -> SonResult<()>;

    // Exits and calls
    fn return_value(&mut self, value: NodeId) -> SonResult<()>;
    fn call(&mut self, name: &str, args: &[NodeId], ret: Ty) -> NodeId;
}

impl GraphBuilder {
    /// Emit an If on `pred` at the current control; returns its arms.
    fn branch(&mut self, pred: NodeId) -> (NodeId, NodeId) {
        let ctrl = self.ctrl();
        let iff = self.emit(Operator::IF, &[Some(ctrl), Some(pred)]);
        self.graph.keep(iff);
        let t = self.emit(Operator::CProj(0), &[Some(iff)]);
        self.graph.keep(t);
        let f = self.emit(Operator::CProj(1), &[Some(iff)]);
        self.graph.unkeep(t);
        self.graph.unkeep(iff);
        (t, f)
    }

    /// A pointer that may be null, or a loop Phi whose type is not known yet.
    fn nullable(&self, p: NodeId) -> bool {
        let t = self.graph.ty(p);
        match self.graph.types.as_ptr(t) {
            Some(ptr) => ptr.nil == Nil::MaybeNil,
            None => t == Ty::BOTTOM && self.graph.op(p).is_phi(),
        }
    }

    /// After testing `pred`, rebind variables holding the tested pointer
    /// to a non-null cast in the arm where it is known non-null: the true
    /// arm for `if (p)`, the false arm for `if (!p)`.
    fn narrow(&mut self, pred: NodeId, on_true: NodeId, on_false: NodeId) {
        let (scope, p) = match self.graph.op(pred) {
            Operator::Not => match self.graph.input(pred, 1) {
                Some(p) => (on_false, p),
                None => return,
            },
            _ => (on_true, pred),
        };
        if !self.nullable(p) {
            return;
        }
        let slots: Vec<usize> = (1..self.graph.node(scope).n_ins())
            .filter(|&i| self.graph.input(scope, i) == Some(p))
            .collect();
        if slots.is_empty() {
            return;
        }
        let ctrl = self.graph.input(scope, 0);
        let cast = self.emit(Operator::Cast(Ty::PTR_NOT_NULL), &[ctrl, Some(p)]);
        if cast == p {
            return;
        }
        for i in slots {
            self.graph.set_def(scope, i, Some(cast));
        }
    }

    /// Merge scope `b` into scope `a` at a new Region, creating a Phi for
    /// every slot that differs. `b` is dropped.
    fn merge_scopes(&mut self, a: NodeId, b: NodeId) -> SonResult<()> {
        let ca = self.graph.input(a, 0);
        let cb = self.graph.input(b, 0);
        let region = self.graph.add_node(Operator::REGION, &[None, ca, cb], self.span);
        let t = self.graph.compute(region);
        self.graph.set_type(region, t);
        self.graph.keep(region);
        self.graph.set_def(a, 0, Some(region));

        for i in 1..self.graph.node(a).n_ins() {
            if self.graph.input(a, i) == self.graph.input(b, i) {
                continue;
            }
            let va = self.read_slot(a, i)?;
            let vb = self.read_slot(b, i)?;
            if va == vb {
                continue;
            }
            let phi = self.emit(Operator::Phi(Ty::BOTTOM), &[Some(region), Some(va), Some(vb)]);
            self.graph.set_def(a, i, Some(phi));
        }

        self.drop_scope(b);
        self.graph.unkeep(region);
        let ctrl = self.graph.peephole(region);
        self.graph.set_def(a, 0, Some(ctrl));
        Ok(())
    }

    fn if_frame(&mut self) -> SonResult<&mut IfFrame> {
        match self.frames.last_mut() {
            Some(Frame::If(frame)) => Ok(frame),
            _ => Err(SonError::internal(Phase::Build, "no open if statement")),
        }
    }

    fn loop_frame(&mut self) -> SonResult<&mut LoopFrame> {
        match self.frames.last_mut() {
            Some(Frame::Loop(frame)) => Ok(frame),
            _ => Err(SonError::internal(Phase::Build, "no open loop")),
        }
    }
}

impl ControlBuilder for GraphBuilder {
    fn begin_if(&mut self, pred: NodeId) -> SonResult<()> {
        let (t, f) = self.branch(pred);
        let other = self.dup_scope(self.scope, false);
        self.graph.keep(other);
        self.graph.set_def(other, 0, Some(f));
        self.set_ctrl(t);
        self.narrow(pred, self.scope, other);
        let depth = self.depth();
        self.frames.push(Frame::If(IfFrame {
            other,
            in_else: false,
            depth,
        }));
        self.push_names();
        Ok(())
    }

    fn else_branch(&mut self) -> SonResult<()> {
        let current = self.scope;
        let frame = self.if_frame()?;
        if frame.in_else {
            return Err(SonError::internal(Phase::Build, "if statement has two else arms"));
        }
        frame.in_else = true;
        let other = std::mem::replace(&mut frame.other, current);
        let depth = frame.depth;

        self.truncate_scope(current, depth);
        self.graph.keep(current);
        self.graph.unkeep(other);
        self.scope = other;
        self.pop_names();
        self.push_names();
        Ok(())
    }

    fn end_if(&mut self) -> SonResult<()> {
        let frame = match self.frames.pop() {
            Some(Frame::If(frame)) => frame,
            Some(other) => {
                self.frames.push(other);
                return Err(SonError::internal(Phase::Build, "end_if closes a loop"));
            }
            None => return Err(SonError::internal(Phase::Build, "no open if statement")),
        };
        self.pop_names();
        let current = self.scope;
        self.truncate_scope(current, frame.depth);
        self.truncate_scope(frame.other, frame.depth);
        self.graph.unkeep(frame.other);

        let (then_scope, else_scope) = if frame.in_else {
            (frame.other, current)
        } else {
            (current, frame.other)
        };
        self.merge_scopes(then_scope, else_scope)?;
        self.scope = then_scope;
        Ok(())
    }

    fn begin_loop(&mut self) -> SonResult<()> {
        let entry = self.ctrl();
        let head_ctrl = self.emit(Operator::LOOP, &[None, Some(entry), None]);
        self.set_ctrl(head_ctrl);
        let head = self.graph.keep(self.scope);
        let body = self.dup_scope(head, true);
        self.scope = body;
        let depth = self.depth();
        self.frames.push(Frame::Loop(LoopFrame {
            head,
            exit: None,
            depth,
        }));
        self.push_names();
        Ok(())
    }

    fn loop_test(&mut self, pred: NodeId) -> SonResult<()> {
        if self.loop_frame()?.exit.is_some() {
            return Err(SonError::internal(Phase::Build, "loop already has a test"));
        }
        let (t, f) = self.branch(pred);
        let exit = self.dup_scope(self.scope, false);
        self.graph.keep(exit);
        self.graph.set_def(exit, 0, Some(f));
        self.set_ctrl(t);
        self.narrow(pred, self.scope, exit);
        self.loop_frame()?.exit = Some(exit);
        Ok(())
    }

    fn end_loop(&mut self) -> SonResult<()> {
        let frame = match self.frames.pop() {
            Some(Frame::Loop(frame)) => frame,
            Some(other) => {
                self.frames.push(other);
                return Err(SonError::internal(Phase::Build, "end_loop closes an if"));
            }
            None => return Err(SonError::internal(Phase::Build, "no open loop")),
        };
        self.pop_names();
        let back = self.scope;
        let head = frame.head;
        self.truncate_scope(back, frame.depth);

        // A loop without a test leaves only through returns.
        let exit = match frame.exit {
            Some(exit) => exit,
            None => {
                let exit = self.dup_scope(back, false);
                self.graph.keep(exit);
                let dead = self.graph.xctrl();
                self.graph.set_def(exit, 0, Some(dead));
                exit
            }
        };
        self.truncate_scope(exit, frame.depth);

        let head_ctrl = self.graph.input(head, 0);
        let wired = match head_ctrl {
            Some(lp) if self.graph.in_progress(lp) => {
                let back_ctrl = self.graph.input(back, 0);
                self.graph.set_def(lp, 2, back_ctrl);
                Some(lp)
            }
            _ => None,
        };

        for i in 1..self.graph.node(head).n_ins() {
            let bv = self.graph.input(back, i);
            if bv != Some(head) {
                if let (Some(lp), Some(phi)) = (wired, self.graph.input(head, i)) {
                    if self.graph.op(phi).is_phi() && self.graph.input(phi, 0) == Some(lp) {
                        self.graph.set_def(phi, 2, bv);
                    }
                }
            }
            if self.graph.input(exit, i) == Some(head) {
                let hv = self.graph.input(head, i);
                self.graph.set_def(exit, i, hv);
            }
        }
        self.drop_scope(back);

        // One eager pass over the new Phis: most of them turn out useless.
        if let Some(lp) = wired {
            for i in 1..self.graph.node(head).n_ins() {
                let Some(phi) = self.graph.input(head, i) else {
                    continue;
                };
                if !self.graph.op(phi).is_phi() || self.graph.input(phi, 0) != Some(lp) {
                    continue;
                }
                let x = self.graph.peephole(phi);
                let outs = self.graph.outputs(phi).to_vec();
                self.graph.worklist_mut().push_all(outs);
                if x != phi && !self.graph.is_dead(phi) {
                    self.graph.subsume(phi, x);
                }
            }
        }

        self.drop_scope(head);
        self.graph.unkeep(exit);
        self.scope = exit;
        Ok(())
    }

    fn return_value(&mut self, value: NodeId) -> SonResult<()> {
        self.add_exit(value)
    }

    fn call(&mut self, name: &str, args: &[NodeId], ret: Ty) -> NodeId {
        let mut inputs = Vec::with_capacity(args.len() + 1);
        inputs.push(Some(self.ctrl()));
        inputs.extend(args.iter().map(|&a| Some(a)));
        let target = CallTarget {
            name: name.into(),
            ret,
        };
        let call = self.emit(Operator::Call(target), &inputs);
        let end = self.emit(Operator::CALL_END, &[Some(call)]);
        self.graph.keep(end);
        let ctrl = self.emit(Operator::CProj(0), &[Some(end)]);
        self.set_ctrl(ctrl);
        let result = self.emit(Operator::Proj(1), &[Some(end)]);
        self.graph.unkeep(end);
        result
    }
}
