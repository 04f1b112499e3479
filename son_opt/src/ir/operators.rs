//! Node operators.
//!
//! The operator set is closed: every peephole and scheduling decision is an
//! exhaustive `match` over [`Operator`]. Operators are grouped by role:
//! - **Control**: Start, Stop, Region, Loop, If, Never, Return, Call, CallEnd
//!   and the control projections hanging off multi-way control nodes
//! - **Values**: constants, projections, phis, casts and arithmetic
//! - **Memory**: loads, stores, allocation and memory merges
//! - **Scope**: the front-end's variable holder, never optimized
//!
//! Each operator also answers the structural questions the optimizer asks:
//! is it control, is it pinned to its block, does it start a basic block,
//! may it be hash-consed.

use son_core::types::Ty;
use std::sync::Arc;

// =============================================================================
// Arithmetic Operators
// =============================================================================

/// Arithmetic shared by the integer and float families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ArithOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    /// Unary negation.
    Neg = 16,
}

impl ArithOp {
    #[inline]
    pub const fn is_commutative(self) -> bool {
        matches!(self, ArithOp::Add | ArithOp::Mul)
    }

    #[inline]
    pub const fn is_unary(self) -> bool {
        (self as u8) >= 16
    }

    /// Right identity: `x op identity == x`.
    pub const fn identity(self) -> Option<i64> {
        match self {
            ArithOp::Add | ArithOp::Sub => Some(0),
            ArithOp::Mul | ArithOp::Div => Some(1),
            ArithOp::Neg => None,
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Neg => "-",
        }
    }
}

// =============================================================================
// Bitwise Operators
// =============================================================================

/// Integer-only bit operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BitwiseOp {
    And = 0,
    Or = 1,
    Xor = 2,
    Shl = 3,
    /// Logical (unsigned) shift right.
    Shr = 4,
    /// Arithmetic shift right.
    Sar = 5,
}

impl BitwiseOp {
    #[inline]
    pub const fn is_commutative(self) -> bool {
        matches!(self, BitwiseOp::And | BitwiseOp::Or | BitwiseOp::Xor)
    }

    /// Right identity, if any.
    pub const fn identity(self) -> Option<i64> {
        match self {
            BitwiseOp::And => Some(-1),
            BitwiseOp::Or | BitwiseOp::Xor => Some(0),
            BitwiseOp::Shl | BitwiseOp::Shr | BitwiseOp::Sar => Some(0),
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            BitwiseOp::And => "&",
            BitwiseOp::Or => "|",
            BitwiseOp::Xor => "^",
            BitwiseOp::Shl => "<<",
            BitwiseOp::Shr => ">>>",
            BitwiseOp::Sar => ">>",
        }
    }
}

// =============================================================================
// Comparison Operators
// =============================================================================

/// Comparisons producing a `bool` (`[0,1]`) result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CmpOp {
    Eq = 0,
    Ne = 1,
    Lt = 2,
    Le = 3,
}

impl CmpOp {
    #[inline]
    pub const fn is_commutative(self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Ne)
    }

    /// Result of comparing a value with itself.
    pub const fn reflexive(self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Le)
    }

    pub fn eval<T: PartialOrd>(self, a: T, b: T) -> bool {
        match self {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
        }
    }
}

// =============================================================================
// Control Operators
// =============================================================================

/// Control-flow node kinds without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlOp {
    /// Entry; produces `[Ctrl, Mem, args...]`.
    Start = 0,
    /// Sentinel exit aggregating every Return.
    Stop = 1,
    /// Merge point; input 0 is unused so inputs align with Phi inputs.
    Region = 2,
    /// Loop header: `[_, entry, back-edge]`.
    Loop = 3,
    /// Two-way branch on a predicate.
    If = 4,
    /// Branch that is never taken at runtime; gives infinite loops an exit.
    Never = 5,
    /// Function exit: `[ctrl, mem, value]`.
    Return = 6,
    /// Continuation after a call; produces `[Ctrl, result]`.
    CallEnd = 7,
}

// =============================================================================
// Memory Operators
// =============================================================================

/// A struct field as seen by loads and stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub name: Arc<str>,
    pub alias: u32,
    /// Declared field type.
    pub declared: Ty,
    pub is_final: bool,
}

/// Memory operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    /// `[ctrl?, mem, ptr, index?]`; the index selects an array element.
    Load(FieldRef),
    /// `[ctrl?, mem, ptr, value, index?]`, then any anti-dependence Loads
    /// code motion adds.
    Store(FieldRef),
    /// `[ctrl, mem per field..., init per field...]`; produces
    /// `[Ctrl, ptr, mem per field...]`. Carries the declared struct.
    New(Ty),
    /// `[_, mem...]`: all alias slices joined for a function exit.
    Merge,
}

/// Callee of an opaque external call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallTarget {
    pub name: Arc<str>,
    /// Declared result type.
    pub ret: Ty,
}

// =============================================================================
// Operator (Unified)
// =============================================================================

/// Every node kind in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Payload-free control node.
    Control(ControlOp),
    /// Control projection `idx` of If/Never/Start/CallEnd.
    CProj(u32),
    /// Opaque call `[ctrl, args...]`.
    Call(CallTarget),

    /// Constant `[start]`.
    Constant(Ty),
    /// Value projection `idx` of a tuple-producing node.
    Proj(u32),
    /// `[region, values...]` with the declared type used while in progress.
    Phi(Ty),
    /// `[ctrl, value]` narrowed by joining the carried type.
    Cast(Ty),

    /// Integer arithmetic `[_, lhs, rhs]` or `[_, x]`.
    IntOp(ArithOp),
    /// Float arithmetic `[_, lhs, rhs]` or `[_, x]`.
    FloatOp(ArithOp),
    /// Integer bit operations `[_, lhs, rhs]`.
    Bitwise(BitwiseOp),
    IntCmp(CmpOp),
    FloatCmp(CmpOp),
    /// Logical not `[_, x]` for ints and pointers.
    Not,
    /// Integer to float conversion `[_, x]`.
    ToFloat,

    Memory(MemoryOp),

    /// Front-end variable holder `[ctrl, slots...]`.
    Scope,
}

impl Operator {
    pub const START: Operator = Operator::Control(ControlOp::Start);
    pub const STOP: Operator = Operator::Control(ControlOp::Stop);
    pub const REGION: Operator = Operator::Control(ControlOp::Region);
    pub const LOOP: Operator = Operator::Control(ControlOp::Loop);
    pub const IF: Operator = Operator::Control(ControlOp::If);
    pub const NEVER: Operator = Operator::Control(ControlOp::Never);
    pub const RETURN: Operator = Operator::Control(ControlOp::Return);
    pub const CALL_END: Operator = Operator::Control(ControlOp::CallEnd);

    /// Part of the control-flow skeleton.
    #[inline]
    pub fn is_cfg(&self) -> bool {
        matches!(
            self,
            Operator::Control(_) | Operator::CProj(_) | Operator::Call(_)
        )
    }

    /// Starts a basic block.
    #[inline]
    pub fn is_block_head(&self) -> bool {
        matches!(
            self,
            Operator::Control(
                ControlOp::Start | ControlOp::Region | ControlOp::Loop | ControlOp::CallEnd
            ) | Operator::CProj(_)
        )
    }

    /// Region or Loop.
    #[inline]
    pub fn is_region(&self) -> bool {
        matches!(
            self,
            Operator::Control(ControlOp::Region | ControlOp::Loop)
        )
    }

    #[inline]
    pub fn is_loop(&self) -> bool {
        matches!(self, Operator::Control(ControlOp::Loop))
    }

    /// Two-way branch (If or the synthetic Never).
    #[inline]
    pub fn is_branch(&self) -> bool {
        matches!(self, Operator::Control(ControlOp::If | ControlOp::Never))
    }

    #[inline]
    pub fn is_phi(&self) -> bool {
        matches!(self, Operator::Phi(_))
    }

    #[inline]
    pub fn is_constant(&self) -> bool {
        matches!(self, Operator::Constant(_))
    }

    /// Produces a tuple consumed through projections.
    #[inline]
    pub fn is_multi(&self) -> bool {
        matches!(
            self,
            Operator::Control(
                ControlOp::Start | ControlOp::If | ControlOp::Never | ControlOp::CallEnd
            ) | Operator::Memory(MemoryOp::New(_))
        )
    }

    #[inline]
    pub fn is_proj(&self) -> bool {
        matches!(self, Operator::Proj(_) | Operator::CProj(_))
    }

    /// Never moved by code motion.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.is_cfg()
            || matches!(
                self,
                Operator::Phi(_) | Operator::Proj(_) | Operator::Cast(_) | Operator::Scope
            )
    }

    #[inline]
    pub fn is_load(&self) -> bool {
        matches!(self, Operator::Memory(MemoryOp::Load(_)))
    }

    #[inline]
    pub fn is_store(&self) -> bool {
        matches!(self, Operator::Memory(MemoryOp::Store(_)))
    }

    /// Eligible for structural hash-consing.
    pub fn is_gvn_candidate(&self) -> bool {
        !self.is_cfg()
            && !matches!(
                self,
                Operator::Scope | Operator::Memory(MemoryOp::New(_))
            )
    }

    pub fn is_commutative(&self) -> bool {
        match self {
            Operator::IntOp(op) | Operator::FloatOp(op) => op.is_commutative(),
            Operator::Bitwise(op) => op.is_commutative(),
            Operator::IntCmp(op) | Operator::FloatCmp(op) => op.is_commutative(),
            _ => false,
        }
    }

    /// Short label for logs and messages.
    pub fn label(&self) -> &'static str {
        match self {
            Operator::Control(op) => match op {
                ControlOp::Start => "Start",
                ControlOp::Stop => "Stop",
                ControlOp::Region => "Region",
                ControlOp::Loop => "Loop",
                ControlOp::If => "If",
                ControlOp::Never => "Never",
                ControlOp::Return => "Return",
                ControlOp::CallEnd => "CallEnd",
            },
            Operator::CProj(0) => "True",
            Operator::CProj(_) => "False",
            Operator::Call(_) => "Call",
            Operator::Constant(_) => "Con",
            Operator::Proj(_) => "Proj",
            Operator::Phi(_) => "Phi",
            Operator::Cast(_) => "Cast",
            Operator::IntOp(op) => match op {
                ArithOp::Add => "Add",
                ArithOp::Sub => "Sub",
                ArithOp::Mul => "Mul",
                ArithOp::Div => "Div",
                ArithOp::Neg => "Minus",
            },
            Operator::FloatOp(op) => match op {
                ArithOp::Add => "AddF",
                ArithOp::Sub => "SubF",
                ArithOp::Mul => "MulF",
                ArithOp::Div => "DivF",
                ArithOp::Neg => "MinusF",
            },
            Operator::Bitwise(op) => match op {
                BitwiseOp::And => "And",
                BitwiseOp::Or => "Or",
                BitwiseOp::Xor => "Xor",
                BitwiseOp::Shl => "Shl",
                BitwiseOp::Shr => "Shr",
                BitwiseOp::Sar => "Sar",
            },
            Operator::IntCmp(_) => "Bool",
            Operator::FloatCmp(_) => "BoolF",
            Operator::Not => "Not",
            Operator::ToFloat => "ToFloat",
            Operator::Memory(op) => match op {
                MemoryOp::Load(_) => "Load",
                MemoryOp::Store(_) => "Store",
                MemoryOp::New(_) => "New",
                MemoryOp::Merge => "MemMerge",
            },
            Operator::Scope => "Scope",
        }
    }
}
