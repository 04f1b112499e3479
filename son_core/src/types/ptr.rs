//! Struct shapes and pointers.

use super::Ty;
use std::sync::Arc;

// =============================================================================
// Nullability
// =============================================================================

/// Four-point nullability chain; `meet` is `max`, `dual` is `3 - n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Nil {
    /// High: free to pick either null or an object.
    Choice = 0,
    /// High: not null.
    XNotNil = 1,
    /// Low: definitely not null.
    NotNil = 2,
    /// Low: possibly null.
    MaybeNil = 3,
}

impl Nil {
    #[inline]
    pub fn meet(self, other: Nil) -> Nil {
        self.max(other)
    }

    #[inline]
    pub fn dual(self) -> Nil {
        match self {
            Nil::Choice => Nil::MaybeNil,
            Nil::XNotNil => Nil::NotNil,
            Nil::NotNil => Nil::XNotNil,
            Nil::MaybeNil => Nil::Choice,
        }
    }

    #[inline]
    pub fn is_high(self) -> bool {
        self <= Nil::XNotNil
    }
}

// =============================================================================
// Structs
// =============================================================================

/// One field of a struct shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: Arc<str>,
    /// Declared field type.
    pub ty: Ty,
    /// Memory alias class holding this field for every instance.
    pub alias: u32,
    pub is_final: bool,
}

/// Struct shape referenced by pointers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StructType {
    Top,
    Bot,
    /// `fields == None` marks a forward reference whose body is not known yet.
    Named {
        name: Arc<str>,
        fields: Option<Arc<[Field]>>,
    },
}

impl StructType {
    /// Forward reference to a struct declared later.
    pub fn forward(name: impl Into<Arc<str>>) -> Self {
        StructType::Named {
            name: name.into(),
            fields: None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            StructType::Named { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Look a field up by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        match self {
            StructType::Named {
                fields: Some(fields),
                ..
            } => fields.iter().find(|f| &*f.name == name),
            _ => None,
        }
    }

    pub fn is_forward_ref(&self) -> bool {
        matches!(self, StructType::Named { fields: None, .. })
    }
}

// =============================================================================
// Pointers
// =============================================================================

/// Pointer to a struct shape.
///
/// `obj` is an interned `StructType`. The null constant is a pointer to the
/// top struct that may be nil: it names no object, only nil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PtrType {
    pub obj: Ty,
    pub nil: Nil,
    /// Writes through this pointer are rejected. `meet` is `or`.
    pub read_only: bool,
}

impl PtrType {
    pub fn is_high(self) -> bool {
        self.nil.is_high()
    }

    /// True if null is a possible low value.
    pub fn may_be_nil(self) -> bool {
        self.nil == Nil::MaybeNil
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_chain() {
        assert_eq!(Nil::NotNil.meet(Nil::MaybeNil), Nil::MaybeNil);
        assert_eq!(Nil::Choice.meet(Nil::NotNil), Nil::NotNil);
        for n in [Nil::Choice, Nil::XNotNil, Nil::NotNil, Nil::MaybeNil] {
            assert_eq!(n.dual().dual(), n);
            assert_eq!(n.dual() as u8, 3 - n as u8);
        }
        assert!(Nil::XNotNil.is_high());
        assert!(!Nil::NotNil.is_high());
    }

    #[test]
    fn test_forward_ref() {
        let s = StructType::forward("List");
        assert!(s.is_forward_ref());
        assert_eq!(s.name(), Some("List"));
        assert!(s.field("next").is_none());
    }
}
