//! Human-readable rendering of types for diagnostics and logs.

use super::{Alias, FloatType, Nil, StructType, Ty, TypeData, TypeTable};
use std::fmt;

/// Borrowing `Display` adapter returned by [`TypeTable::display`].
pub struct TypeDisplay<'a> {
    table: &'a TypeTable,
    ty: Ty,
}

impl<'a> TypeDisplay<'a> {
    pub(super) fn new(table: &'a TypeTable, ty: Ty) -> Self {
        TypeDisplay { table, ty }
    }

    fn nested(&self, ty: Ty) -> TypeDisplay<'a> {
        TypeDisplay {
            table: self.table,
            ty,
        }
    }
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.table.get(self.ty) {
            TypeData::Bottom => f.write_str("Bot"),
            TypeData::Top => f.write_str("Top"),
            TypeData::Control => f.write_str("Ctrl"),
            TypeData::XControl => f.write_str("~Ctrl"),
            TypeData::Int(i) => {
                if let Some(v) = i.value() {
                    write!(f, "{v}")
                } else if *i == super::IntType::BOT {
                    f.write_str("int")
                } else if *i == super::IntType::TOP {
                    f.write_str("~int")
                } else if *i == super::IntType::BOOL {
                    f.write_str("bool")
                } else if i.is_high() {
                    write!(f, "~[{},{}]", i.max, i.min)
                } else {
                    write!(f, "[{},{}]", i.min, i.max)
                }
            }
            TypeData::Float(fl) => match fl.value() {
                Some(v) => write!(f, "{v:?}"),
                None => f.write_str(match *fl {
                    FloatType::F64 => "flt",
                    FloatType::F32 => "f32",
                    FloatType::F64_TOP => "~flt",
                    _ => "~f32",
                }),
            },
            TypeData::Struct(s) => match s {
                StructType::Top => f.write_str("$TOP"),
                StructType::Bot => f.write_str("$BOT"),
                StructType::Named { name, .. } => f.write_str(name),
            },
            TypeData::Ptr(p) => {
                if self.ty == Ty::NULL {
                    return f.write_str("null");
                }
                if p.is_high() {
                    f.write_str("~")?;
                }
                f.write_str("*")?;
                if p.read_only {
                    f.write_str("val ")?;
                }
                write!(f, "{}", self.nested(p.obj))?;
                if matches!(p.nil, Nil::MaybeNil | Nil::Choice) {
                    f.write_str("?")?;
                }
                Ok(())
            }
            TypeData::Tuple(elems) => {
                f.write_str("[")?;
                for (i, &e) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", self.nested(e))?;
                }
                f.write_str("]")
            }
            TypeData::Mem(m) => match m.alias {
                Alias::Top => f.write_str("#TOP"),
                Alias::Bot => f.write_str("#BOT"),
                Alias::Class(a) => write!(f, "#{}:{}", a, self.nested(m.t)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Field, TypeTable};
    use super::*;

    #[test]
    fn test_render_scalars() {
        let mut table = TypeTable::new();
        let seven = table.int(7);
        assert_eq!(table.str(seven), "7");
        assert_eq!(table.str(Ty::INT_BOT), "int");
        assert_eq!(table.str(Ty::BOOL), "bool");
        let r = table.int_range(2, 9);
        assert_eq!(table.str(r), "[2,9]");
        assert_eq!(table.str(Ty::F64), "flt");
        let c = table.float(1.5);
        assert_eq!(table.str(c), "1.5");
        assert_eq!(table.str(Ty::IF_TRUE), "[Ctrl, ~Ctrl]");
    }

    #[test]
    fn test_render_pointers() {
        let mut table = TypeTable::new();
        let alias = table.fresh_alias();
        let s = table.struct_type(
            "Point",
            vec![Field {
                name: "x".into(),
                ty: Ty::INT_BOT,
                alias,
                is_final: false,
            }],
        );
        let p = table.ptr(s, false);
        let q = table.ptr(s, true);
        assert_eq!(table.str(p), "*Point");
        assert_eq!(table.str(q), "*Point?");
        assert_eq!(table.str(Ty::NULL), "null");
        let m = table.mem(alias, Ty::INT_BOT);
        assert_eq!(table.str(m), format!("#{alias}:int"));
    }
}
