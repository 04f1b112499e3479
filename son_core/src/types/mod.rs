//! The type lattice.
//!
//! Every node caches one [`Ty`], a handle into a per-compilation
//! [`TypeTable`] that interns immutable [`TypeData`] values. Interning makes
//! type equality a handle compare and lets nodes share types freely.
//!
//! The lattice is symmetric around `dual`:
//! - **meet** (`x ∧ y`) is the greatest lower bound, used at control merges
//! - **join** (`x ∨ y`) is `dual(dual(x) ∧ dual(y))`, used to narrow after a guard
//! - **isa** (`x isa y`) holds when `x ∧ y == y`, i.e. `x` is at least as precise
//!
//! Values only ever move from TOP toward BOTTOM while optimizing.
//!
//! Categories (meet across categories falls to BOTTOM):
//! - Control / XControl
//! - Integer ranges ([`IntType`])
//! - Floats ([`FloatType`])
//! - Struct shapes and pointers ([`StructType`], [`PtrType`])
//! - Tuples, for multi-output nodes
//! - Memory slices per alias class ([`MemType`])

mod display;
mod float;
mod int;
mod mem;
mod ptr;

pub use display::TypeDisplay;
pub use float::FloatType;
pub use int::IntType;
pub use mem::{Alias, MemType};
pub use ptr::{Field, Nil, PtrType, StructType};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Length field of an array.
pub const ARRAY_LEN: &str = "#";
/// Element body of an array.
pub const ARRAY_BODY: &str = "[]";

// =============================================================================
// Type Handle
// =============================================================================

/// Interned type handle. Only meaningful with the table that created it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ty(u32);

impl Ty {
    pub const BOTTOM: Ty = Ty(0);
    pub const TOP: Ty = Ty(1);
    pub const CONTROL: Ty = Ty(2);
    pub const XCONTROL: Ty = Ty(3);
    pub const INT_BOT: Ty = Ty(4);
    pub const INT_TOP: Ty = Ty(5);
    pub const ZERO: Ty = Ty(6);
    pub const ONE: Ty = Ty(7);
    pub const BOOL: Ty = Ty(8);
    pub const F64: Ty = Ty(9);
    pub const F64_TOP: Ty = Ty(10);
    pub const F32: Ty = Ty(11);
    pub const F32_TOP: Ty = Ty(12);
    pub const STRUCT_BOT: Ty = Ty(13);
    pub const STRUCT_TOP: Ty = Ty(14);
    /// Pointer to anything, possibly null, possibly read-only.
    pub const PTR_BOT: Ty = Ty(15);
    pub const PTR_TOP: Ty = Ty(16);
    pub const NULL: Ty = Ty(17);
    pub const MEM_BOT: Ty = Ty(18);
    pub const MEM_TOP: Ty = Ty(19);
    pub const IF_BOTH: Ty = Ty(20);
    pub const IF_NEITHER: Ty = Ty(21);
    pub const IF_TRUE: Ty = Ty(22);
    pub const IF_FALSE: Ty = Ty(23);
    /// Any non-null pointer; joined in to narrow after a null check.
    pub const PTR_NOT_NULL: Ty = Ty(24);

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ty{}", self.0)
    }
}

// =============================================================================
// Type Data
// =============================================================================

/// The interned payload behind a [`Ty`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeData {
    Bottom,
    Top,
    Control,
    XControl,
    Int(IntType),
    Float(FloatType),
    Struct(StructType),
    Ptr(PtrType),
    Tuple(Box<[Ty]>),
    Mem(MemType),
}

/// What a value's type says about its truthiness when used as a branch test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    /// High type: no value flows yet.
    Neither,
    AlwaysTrue,
    AlwaysFalse,
    Unknown,
}

// =============================================================================
// Type Table
// =============================================================================

/// Interning table and lattice operations for one compilation.
#[derive(Debug, Clone)]
pub struct TypeTable {
    data: Vec<TypeData>,
    map: FxHashMap<TypeData, Ty>,
    meet_cache: FxHashMap<(Ty, Ty), Ty>,
    dual_cache: FxHashMap<Ty, Ty>,
    next_alias: u32,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    /// Create a table holding the predefined types at their fixed handles.
    pub fn new() -> Self {
        let mut table = TypeTable {
            data: Vec::with_capacity(64),
            map: FxHashMap::default(),
            meet_cache: FxHashMap::default(),
            dual_cache: FxHashMap::default(),
            next_alias: 1,
        };
        let fixed = [
            (Ty::BOTTOM, TypeData::Bottom),
            (Ty::TOP, TypeData::Top),
            (Ty::CONTROL, TypeData::Control),
            (Ty::XCONTROL, TypeData::XControl),
            (Ty::INT_BOT, TypeData::Int(IntType::BOT)),
            (Ty::INT_TOP, TypeData::Int(IntType::TOP)),
            (Ty::ZERO, TypeData::Int(IntType::con(0))),
            (Ty::ONE, TypeData::Int(IntType::con(1))),
            (Ty::BOOL, TypeData::Int(IntType::BOOL)),
            (Ty::F64, TypeData::Float(FloatType::F64)),
            (Ty::F64_TOP, TypeData::Float(FloatType::F64_TOP)),
            (Ty::F32, TypeData::Float(FloatType::F32)),
            (Ty::F32_TOP, TypeData::Float(FloatType::F32_TOP)),
            (Ty::STRUCT_BOT, TypeData::Struct(StructType::Bot)),
            (Ty::STRUCT_TOP, TypeData::Struct(StructType::Top)),
            (
                Ty::PTR_BOT,
                TypeData::Ptr(PtrType {
                    obj: Ty::STRUCT_BOT,
                    nil: Nil::MaybeNil,
                    read_only: true,
                }),
            ),
            (
                Ty::PTR_TOP,
                TypeData::Ptr(PtrType {
                    obj: Ty::STRUCT_TOP,
                    nil: Nil::Choice,
                    read_only: false,
                }),
            ),
            (
                Ty::NULL,
                TypeData::Ptr(PtrType {
                    obj: Ty::STRUCT_TOP,
                    nil: Nil::MaybeNil,
                    read_only: false,
                }),
            ),
            (
                Ty::MEM_BOT,
                TypeData::Mem(MemType {
                    alias: Alias::Bot,
                    t: Ty::BOTTOM,
                }),
            ),
            (
                Ty::MEM_TOP,
                TypeData::Mem(MemType {
                    alias: Alias::Top,
                    t: Ty::TOP,
                }),
            ),
            (
                Ty::IF_BOTH,
                TypeData::Tuple(Box::new([Ty::CONTROL, Ty::CONTROL])),
            ),
            (
                Ty::IF_NEITHER,
                TypeData::Tuple(Box::new([Ty::XCONTROL, Ty::XCONTROL])),
            ),
            (
                Ty::IF_TRUE,
                TypeData::Tuple(Box::new([Ty::CONTROL, Ty::XCONTROL])),
            ),
            (
                Ty::IF_FALSE,
                TypeData::Tuple(Box::new([Ty::XCONTROL, Ty::CONTROL])),
            ),
            (
                Ty::PTR_NOT_NULL,
                TypeData::Ptr(PtrType {
                    obj: Ty::STRUCT_BOT,
                    nil: Nil::NotNil,
                    read_only: true,
                }),
            ),
        ];
        for (handle, data) in fixed {
            let got = table.intern(data);
            debug_assert_eq!(got, handle, "predefined type out of order");
        }
        table
    }

    /// Intern `data`, returning its unique handle.
    pub fn intern(&mut self, data: TypeData) -> Ty {
        if let Some(&ty) = self.map.get(&data) {
            return ty;
        }
        let ty = Ty(self.data.len() as u32);
        self.data.push(data.clone());
        self.map.insert(data, ty);
        ty
    }

    /// Payload of an interned type.
    #[inline]
    pub fn get(&self, ty: Ty) -> &TypeData {
        &self.data[ty.0 as usize]
    }

    /// Number of distinct interned types.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Allocate a fresh memory alias class.
    pub fn fresh_alias(&mut self) -> u32 {
        let alias = self.next_alias;
        self.next_alias += 1;
        alias
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    pub fn int(&mut self, v: i64) -> Ty {
        self.intern(TypeData::Int(IntType::con(v)))
    }

    pub fn int_range(&mut self, min: i64, max: i64) -> Ty {
        self.intern(TypeData::Int(IntType::range(min, max)))
    }

    pub fn int_type(&mut self, t: IntType) -> Ty {
        self.intern(TypeData::Int(t))
    }

    pub fn float(&mut self, v: f64) -> Ty {
        self.intern(TypeData::Float(FloatType::con(v)))
    }

    pub fn float_type(&mut self, t: FloatType) -> Ty {
        self.intern(TypeData::Float(t))
    }

    pub fn tuple(&mut self, elems: &[Ty]) -> Ty {
        self.intern(TypeData::Tuple(elems.into()))
    }

    pub fn mem(&mut self, alias: u32, t: Ty) -> Ty {
        self.intern(TypeData::Mem(MemType {
            alias: Alias::Class(alias),
            t,
        }))
    }

    /// Declare a struct shape. Field aliases must already be allocated.
    pub fn struct_type(&mut self, name: impl Into<Arc<str>>, fields: Vec<Field>) -> Ty {
        self.intern(TypeData::Struct(StructType::Named {
            name: name.into(),
            fields: Some(fields.into()),
        }))
    }

    /// Array of `elem`: a struct named `[elem]` with a final length field
    /// [`ARRAY_LEN`] and the element body [`ARRAY_BODY`]. Every element
    /// shares the body alias.
    pub fn array_type(&mut self, elem: Ty, len_alias: u32, body_alias: u32) -> Ty {
        let name = self.array_name(elem);
        let fields = vec![
            Field {
                name: ARRAY_LEN.into(),
                ty: Ty::INT_BOT,
                alias: len_alias,
                is_final: true,
            },
            Field {
                name: ARRAY_BODY.into(),
                ty: elem,
                alias: body_alias,
                is_final: false,
            },
        ];
        self.struct_type(name, fields)
    }

    /// Struct name of the array of `elem`.
    pub fn array_name(&self, elem: Ty) -> String {
        format!("[{}]", self.display(elem))
    }

    /// Forward reference to a struct whose fields are not known yet.
    pub fn struct_forward(&mut self, name: impl Into<Arc<str>>) -> Ty {
        self.intern(TypeData::Struct(StructType::forward(name)))
    }

    /// Pointer to `obj`; `nullable` selects between `*S?` and `*S`.
    pub fn ptr(&mut self, obj: Ty, nullable: bool) -> Ty {
        let nil = if nullable { Nil::MaybeNil } else { Nil::NotNil };
        self.intern(TypeData::Ptr(PtrType {
            obj,
            nil,
            read_only: false,
        }))
    }

    /// Same pointer with the given read-only bit.
    pub fn ptr_read_only(&mut self, ptr: Ty, read_only: bool) -> Ty {
        match *self.get(ptr) {
            TypeData::Ptr(p) => self.intern(TypeData::Ptr(PtrType { read_only, ..p })),
            _ => ptr,
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn is_high(&self, ty: Ty) -> bool {
        match self.get(ty) {
            TypeData::Top | TypeData::XControl => true,
            TypeData::Int(i) => i.is_high(),
            TypeData::Float(f) => f.is_high(),
            TypeData::Struct(s) => matches!(s, StructType::Top),
            TypeData::Ptr(p) => p.is_high(),
            TypeData::Mem(m) => m.alias == Alias::Top || self.is_high(m.t),
            TypeData::Bottom | TypeData::Control | TypeData::Tuple(_) => false,
        }
    }

    /// True for types describing exactly one runtime value.
    pub fn is_constant(&self, ty: Ty) -> bool {
        match self.get(ty) {
            TypeData::Int(i) => i.is_constant(),
            TypeData::Float(f) => f.is_constant(),
            TypeData::Ptr(_) => ty == Ty::NULL,
            _ => false,
        }
    }

    pub fn is_high_or_const(&self, ty: Ty) -> bool {
        self.is_high(ty) || self.is_constant(ty)
    }

    /// Integer constant value.
    pub fn int_value(&self, ty: Ty) -> Option<i64> {
        match self.get(ty) {
            TypeData::Int(i) => i.value(),
            _ => None,
        }
    }

    pub fn as_int(&self, ty: Ty) -> Option<IntType> {
        match self.get(ty) {
            TypeData::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self, ty: Ty) -> Option<FloatType> {
        match self.get(ty) {
            TypeData::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_ptr(&self, ty: Ty) -> Option<PtrType> {
        match self.get(ty) {
            TypeData::Ptr(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_struct(&self, ty: Ty) -> Option<&StructType> {
        match self.get(ty) {
            TypeData::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_mem(&self, ty: Ty) -> Option<MemType> {
        match self.get(ty) {
            TypeData::Mem(m) => Some(*m),
            _ => None,
        }
    }

    /// Element `idx` of a tuple; TOP and BOTTOM project to themselves.
    pub fn tuple_elem(&self, ty: Ty, idx: usize) -> Ty {
        match self.get(ty) {
            TypeData::Tuple(elems) => elems.get(idx).copied().unwrap_or(Ty::BOTTOM),
            TypeData::Top => Ty::TOP,
            _ => Ty::BOTTOM,
        }
    }

    pub fn is_int(&self, ty: Ty) -> bool {
        matches!(self.get(ty), TypeData::Int(_))
    }

    pub fn is_float(&self, ty: Ty) -> bool {
        matches!(self.get(ty), TypeData::Float(_))
    }

    pub fn is_ptr(&self, ty: Ty) -> bool {
        matches!(self.get(ty), TypeData::Ptr(_))
    }

    /// Classify a branch test value.
    pub fn truthiness(&self, ty: Ty) -> Truth {
        if self.is_high(ty) {
            return Truth::Neither;
        }
        match self.get(ty) {
            TypeData::Int(i) => match i.value() {
                Some(0) => Truth::AlwaysFalse,
                Some(_) => Truth::AlwaysTrue,
                None if !i.contains(0) => Truth::AlwaysTrue,
                None => Truth::Unknown,
            },
            TypeData::Float(f) => match f.value() {
                Some(v) if v == 0.0 => Truth::AlwaysFalse,
                Some(_) => Truth::AlwaysTrue,
                None => Truth::Unknown,
            },
            TypeData::Ptr(p) => {
                if ty == Ty::NULL {
                    Truth::AlwaysFalse
                } else if p.nil == Nil::NotNil {
                    Truth::AlwaysTrue
                } else {
                    Truth::Unknown
                }
            }
            _ => Truth::Unknown,
        }
    }

    // =========================================================================
    // Lattice Operations
    // =========================================================================

    /// Greatest lower bound. Commutative, associative and idempotent.
    pub fn meet(&mut self, a: Ty, b: Ty) -> Ty {
        if a == b {
            return a;
        }
        let key = if a < b { (a, b) } else { (b, a) };
        if let Some(&ty) = self.meet_cache.get(&key) {
            return ty;
        }
        let ty = self.xmeet(key.0, key.1);
        self.meet_cache.insert(key, ty);
        ty
    }

    fn xmeet(&mut self, a: Ty, b: Ty) -> Ty {
        match (self.get(a), self.get(b)) {
            (TypeData::Bottom, _) | (_, TypeData::Bottom) => Ty::BOTTOM,
            (TypeData::Top, _) => b,
            (_, TypeData::Top) => a,
            (
                TypeData::Control | TypeData::XControl,
                TypeData::Control | TypeData::XControl,
            ) => Ty::CONTROL,
            (TypeData::Int(x), TypeData::Int(y)) => {
                let r = x.meet(*y);
                self.int_type(r)
            }
            (TypeData::Float(x), TypeData::Float(y)) => {
                let r = x.meet(*y);
                self.float_type(r)
            }
            (TypeData::Struct(x), TypeData::Struct(y)) => {
                let (x, y) = (x.clone(), y.clone());
                self.meet_struct(&x, &y)
            }
            (TypeData::Ptr(x), TypeData::Ptr(y)) => {
                let (x, y) = (*x, *y);
                let obj = self.meet(x.obj, y.obj);
                self.intern(TypeData::Ptr(PtrType {
                    obj,
                    nil: x.nil.meet(y.nil),
                    read_only: x.read_only || y.read_only,
                }))
            }
            (TypeData::Tuple(x), TypeData::Tuple(y)) if x.len() == y.len() => {
                let pairs: SmallVec<[(Ty, Ty); 4]> =
                    x.iter().copied().zip(y.iter().copied()).collect();
                let elems: SmallVec<[Ty; 4]> =
                    pairs.into_iter().map(|(p, q)| self.meet(p, q)).collect();
                self.tuple(&elems)
            }
            (TypeData::Mem(x), TypeData::Mem(y)) => {
                let (x, y) = (*x, *y);
                let t = self.meet(x.t, y.t);
                self.intern(TypeData::Mem(MemType {
                    alias: x.alias.meet(y.alias),
                    t,
                }))
            }
            _ => Ty::BOTTOM,
        }
    }

    fn meet_struct(&mut self, x: &StructType, y: &StructType) -> Ty {
        use StructType::*;
        match (x, y) {
            (Bot, _) | (_, Bot) => Ty::STRUCT_BOT,
            (Top, other) | (other, Top) => self.intern(TypeData::Struct(other.clone())),
            (
                Named {
                    name: xn,
                    fields: xf,
                },
                Named {
                    name: yn,
                    fields: yf,
                },
            ) => {
                if xn != yn {
                    return Ty::STRUCT_BOT;
                }
                match (xf, yf) {
                    (Some(xf), Some(yf)) => {
                        let compatible = xf.len() == yf.len()
                            && xf
                                .iter()
                                .zip(yf.iter())
                                .all(|(p, q)| p.name == q.name && p.alias == q.alias);
                        if !compatible {
                            return Ty::STRUCT_BOT;
                        }
                        let mut fields = Vec::with_capacity(xf.len());
                        for (p, q) in xf.iter().zip(yf.iter()) {
                            let ty = self.meet(p.ty, q.ty);
                            fields.push(Field {
                                ty,
                                is_final: p.is_final && q.is_final,
                                ..p.clone()
                            });
                        }
                        self.struct_type(xn.clone(), fields)
                    }
                    (Some(_), None) => self.intern(TypeData::Struct(x.clone())),
                    (None, _) => self.intern(TypeData::Struct(y.clone())),
                }
            }
        }
    }

    /// Order-reversing involution.
    pub fn dual(&mut self, ty: Ty) -> Ty {
        if let Some(&d) = self.dual_cache.get(&ty) {
            return d;
        }
        let d = match self.get(ty).clone() {
            TypeData::Bottom => Ty::TOP,
            TypeData::Top => Ty::BOTTOM,
            TypeData::Control => Ty::XCONTROL,
            TypeData::XControl => Ty::CONTROL,
            TypeData::Int(i) => self.int_type(i.dual()),
            TypeData::Float(f) => self.float_type(f.dual()),
            TypeData::Struct(StructType::Top) => Ty::STRUCT_BOT,
            TypeData::Struct(StructType::Bot) => Ty::STRUCT_TOP,
            TypeData::Struct(StructType::Named { name, fields: None }) => {
                self.struct_forward(name)
            }
            TypeData::Struct(StructType::Named {
                name,
                fields: Some(fields),
            }) => {
                let mut duals = Vec::with_capacity(fields.len());
                for f in fields.iter() {
                    let ty = self.dual(f.ty);
                    duals.push(Field { ty, ..f.clone() });
                }
                self.struct_type(name, duals)
            }
            TypeData::Ptr(p) => {
                let obj = self.dual(p.obj);
                self.intern(TypeData::Ptr(PtrType {
                    obj,
                    nil: p.nil.dual(),
                    read_only: !p.read_only,
                }))
            }
            TypeData::Tuple(elems) => {
                let duals: SmallVec<[Ty; 4]> = elems.iter().map(|&e| self.dual(e)).collect();
                self.tuple(&duals)
            }
            TypeData::Mem(m) => {
                let t = self.dual(m.t);
                self.intern(TypeData::Mem(MemType {
                    alias: m.alias.dual(),
                    t,
                }))
            }
        };
        self.dual_cache.insert(ty, d);
        self.dual_cache.insert(d, ty);
        d
    }

    /// Least upper bound: `dual(dual(a) ∧ dual(b))`.
    pub fn join(&mut self, a: Ty, b: Ty) -> Ty {
        if a == b {
            return a;
        }
        let da = self.dual(a);
        let db = self.dual(b);
        let m = self.meet(da, db);
        self.dual(m)
    }

    /// `a isa b` when `a` is at least as precise as `b`.
    pub fn isa(&mut self, a: Ty, b: Ty) -> bool {
        self.meet(a, b) == b
    }

    /// Widen a loop-carried integer range so loops reach a fixpoint quickly.
    pub fn widen(&mut self, ty: Ty) -> Ty {
        match *self.get(ty) {
            TypeData::Int(i) => {
                let w = i.widen();
                self.int_type(w)
            }
            _ => ty,
        }
    }

    /// The not-null version of a pointer type; other types are unchanged.
    pub fn non_null(&mut self, ty: Ty) -> Ty {
        match *self.get(ty) {
            TypeData::Ptr(p) if p.nil == Nil::MaybeNil => self.intern(TypeData::Ptr(PtrType {
                nil: Nil::NotNil,
                ..p
            })),
            _ => ty,
        }
    }

    /// Most general type of the same category; used for declared types.
    pub fn glb(&self, ty: Ty) -> Ty {
        match self.get(ty) {
            TypeData::Int(_) => Ty::INT_BOT,
            TypeData::Float(f) if f.is_f32() => Ty::F32,
            TypeData::Float(_) => Ty::F64,
            TypeData::Ptr(_) => Ty::PTR_BOT,
            TypeData::Mem(_) => Ty::MEM_BOT,
            TypeData::Control | TypeData::XControl => Ty::CONTROL,
            _ => Ty::BOTTOM,
        }
    }

    /// Render a type for messages.
    pub fn display(&self, ty: Ty) -> TypeDisplay<'_> {
        TypeDisplay::new(self, ty)
    }

    /// Convenience wrapper returning an owned string.
    pub fn str(&self, ty: Ty) -> String {
        self.display(ty).to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn point(table: &mut TypeTable) -> (Ty, Ty) {
        let ax = table.fresh_alias();
        let ay = table.fresh_alias();
        let s = table.struct_type(
            "Point",
            vec![
                Field {
                    name: "x".into(),
                    ty: Ty::INT_BOT,
                    alias: ax,
                    is_final: false,
                },
                Field {
                    name: "y".into(),
                    ty: Ty::INT_BOT,
                    alias: ay,
                    is_final: true,
                },
            ],
        );
        let p = table.ptr(s, false);
        (s, p)
    }

    #[test]
    fn test_predefined_handles() {
        let table = TypeTable::new();
        assert_eq!(table.get(Ty::ZERO), &TypeData::Int(IntType::con(0)));
        assert_eq!(table.get(Ty::XCONTROL), &TypeData::XControl);
        assert!(table.is_high(Ty::INT_TOP));
        assert!(!table.is_high(Ty::INT_BOT));
    }

    #[test]
    fn test_interning_dedups() {
        let mut table = TypeTable::new();
        let a = table.int(42);
        let b = table.int(42);
        assert_eq!(a, b);
        assert_eq!(table.int(0), Ty::ZERO);
    }

    #[test]
    fn test_control_meet() {
        let mut table = TypeTable::new();
        assert_eq!(table.meet(Ty::CONTROL, Ty::XCONTROL), Ty::CONTROL);
        assert_eq!(table.meet(Ty::XCONTROL, Ty::XCONTROL), Ty::XCONTROL);
        assert_eq!(table.meet(Ty::CONTROL, Ty::INT_BOT), Ty::BOTTOM);
    }

    #[test]
    fn test_int_meet_and_isa() {
        let mut table = TypeTable::new();
        let three = table.int(3);
        let four = table.int(4);
        let m = table.meet(three, four);
        assert_eq!(table.as_int(m), Some(IntType::range(3, 4)));
        assert!(table.isa(three, m));
        assert!(table.isa(m, Ty::INT_BOT));
        assert!(!table.isa(Ty::INT_BOT, m));
        assert!(table.isa(Ty::INT_TOP, three));
    }

    #[test]
    fn test_cross_category_is_bottom() {
        let mut table = TypeTable::new();
        assert_eq!(table.meet(Ty::ONE, Ty::NULL), Ty::BOTTOM);
        assert_eq!(table.meet(Ty::ONE, Ty::F64), Ty::BOTTOM);
    }

    #[test]
    fn test_join_narrows() {
        let mut table = TypeTable::new();
        let r = table.int_range(0, 10);
        let s = table.int_range(5, 20);
        let j = table.join(r, s);
        assert_eq!(table.as_int(j), Some(IntType::range(5, 10)));
        assert!(table.isa(j, r));
        assert!(table.isa(j, s));
    }

    #[test]
    fn test_pointer_nullability() {
        let mut table = TypeTable::new();
        let (s, p) = point(&mut table);
        let nullable = table.meet(p, Ty::NULL);
        assert_eq!(nullable, table.ptr(s, true));
        assert_eq!(table.non_null(nullable), p);
        assert_eq!(table.truthiness(p), Truth::AlwaysTrue);
        assert_eq!(table.truthiness(nullable), Truth::Unknown);
        assert_eq!(table.truthiness(Ty::NULL), Truth::AlwaysFalse);
    }

    #[test]
    fn test_pointer_join_removes_nil() {
        let mut table = TypeTable::new();
        let (s, p) = point(&mut table);
        let nullable = table.ptr(s, true);
        let narrowed = table.join(nullable, Ty::PTR_NOT_NULL);
        assert_eq!(narrowed, p);
        assert!(table.isa(narrowed, nullable));
    }

    #[test]
    fn test_distinct_structs_meet_to_bottom() {
        let mut table = TypeTable::new();
        let (s, _) = point(&mut table);
        let other = table.struct_type("Other", vec![]);
        assert_eq!(table.meet(s, other), Ty::STRUCT_BOT);
    }

    #[test]
    fn test_forward_ref_meets_to_body() {
        let mut table = TypeTable::new();
        let (s, _) = point(&mut table);
        let fref = table.struct_forward("Point");
        assert_eq!(table.meet(fref, s), s);
    }

    #[test]
    fn test_memory_alias_meet() {
        let mut table = TypeTable::new();
        let a = table.mem(1, Ty::INT_BOT);
        let b = table.mem(2, Ty::INT_BOT);
        let m = table.meet(a, b);
        assert_eq!(
            table.as_mem(m),
            Some(MemType {
                alias: Alias::Bot,
                t: Ty::INT_BOT
            })
        );
        assert_eq!(table.meet(a, Ty::MEM_TOP), a);
        assert_eq!(table.meet(a, Ty::MEM_BOT), Ty::MEM_BOT);
    }

    #[test]
    fn test_if_tuples() {
        let mut table = TypeTable::new();
        assert_eq!(table.meet(Ty::IF_TRUE, Ty::IF_FALSE), Ty::IF_BOTH);
        assert_eq!(table.dual(Ty::IF_BOTH), Ty::IF_NEITHER);
        assert_eq!(table.tuple_elem(Ty::IF_TRUE, 0), Ty::CONTROL);
        assert_eq!(table.tuple_elem(Ty::IF_TRUE, 1), Ty::XCONTROL);
    }

    #[test]
    fn test_truthiness_ranges() {
        let mut table = TypeTable::new();
        let pos = table.int_range(1, 9);
        assert_eq!(table.truthiness(pos), Truth::AlwaysTrue);
        assert_eq!(table.truthiness(Ty::BOOL), Truth::Unknown);
        assert_eq!(table.truthiness(Ty::ZERO), Truth::AlwaysFalse);
        assert_eq!(table.truthiness(Ty::INT_TOP), Truth::Neither);
    }

    #[test]
    fn test_glb_keeps_category() {
        let mut table = TypeTable::new();
        let (_, p) = point(&mut table);
        let five = table.int(5);
        assert_eq!(table.glb(five), Ty::INT_BOT);
        assert_eq!(table.glb(Ty::F32), Ty::F32);
        assert_eq!(table.glb(p), Ty::PTR_BOT);
        assert!(table.isa(p, Ty::PTR_BOT));
        assert_eq!(table.glb(Ty::TOP), Ty::BOTTOM);
    }

    #[test]
    fn test_array_shape() {
        let mut table = TypeTable::new();
        let (len, body) = (table.fresh_alias(), table.fresh_alias());
        let ary = table.array_type(Ty::INT_BOT, len, body);
        assert_eq!(table.array_name(Ty::INT_BOT), "[int]");
        let Some(StructType::Named { name, fields: Some(fields) }) = table.as_struct(ary) else {
            panic!("array is a named struct");
        };
        assert_eq!(&**name, "[int]");
        assert_eq!(&*fields[0].name, ARRAY_LEN);
        assert!(fields[0].is_final);
        assert_eq!(fields[1].ty, Ty::INT_BOT);
        assert_ne!(fields[0].alias, fields[1].alias);

        // Same element, same aliases: one interned type.
        assert_eq!(table.array_type(Ty::INT_BOT, len, body), ary);
        let flt = table.array_type(Ty::F64, len, body);
        assert_ne!(flt, ary);
        let m = table.meet(flt, ary);
        assert_eq!(m, Ty::STRUCT_BOT);
    }

    #[test]
    fn test_widen() {
        let mut table = TypeTable::new();
        let r = table.int_range(0, 3);
        assert_eq!(table.widen(r), Ty::INT_BOT);
        assert_eq!(table.widen(Ty::ONE), Ty::ONE);
    }
}
