use super::GraphBuilder;
use crate::ir::node::NodeId;
use crate::ir::operators::{FieldRef, MemoryOp, Operator};
use son_core::error::{SonError, SonResult};
use son_core::types::{Field, Nil, Ty, ARRAY_BODY, ARRAY_LEN};
use std::sync::Arc;

/// A declared struct: its shape and the field handles loads and stores use.
#[derive(Debug, Clone)]
pub struct StructDecl {
    /// The struct type with its fields.
    pub ty: Ty,
    /// Non-null pointer to the struct, as produced by `new`.
    pub ptr: Ty,
    pub fields: Arc<[FieldRef]>,
}

/// Builder trait for struct and array allocation and field access.
///
/// Pointer types name their struct, so a field may refer to a struct that
/// is declared later (or to its own struct) through [`ObjectBuilder::ref_type`].
/// Arrays are structs named `[elem]`; their accessors take the element type
/// since the pointer type may not be precise while the graph is built.
pub trait ObjectBuilder {
    /// Declare a struct; each field gets its own alias class.
    fn declare_struct(&mut self, name: &str, fields: &[(&str, Ty, bool)]) -> SonResult<Ty>;
    /// Pointer to struct `name`, declared or not.
    fn ref_type(&mut self, name: &str, nullable: bool) -> Ty;
    fn field(&self, struct_name: &str, field: &str) -> SonResult<FieldRef>;

    /// Allocate with every field at its zero value.
    fn new_struct(&mut self, name: &str) -> SonResult<NodeId>;
    /// Allocate with explicit initial values, one per field.
    fn new_struct_init(&mut self, name: &str, inits: &[NodeId]) -> SonResult<NodeId>;

    fn load(&mut self, ptr: NodeId, field: &FieldRef) -> SonResult<NodeId>;
    fn store(&mut self, ptr: NodeId, field: &FieldRef, value: NodeId) -> SonResult<()>;

    /// Declare the array of `elem` unless it exists; returns its struct
    /// type, named as [`TypeTable::array_name`](son_core::types::TypeTable::array_name).
    /// Arrays of references must be nullable.
    fn declare_array(&mut self, elem: Ty) -> SonResult<Ty>;
    /// Allocate `len` elements, each at the element's zero value.
    fn new_array(&mut self, elem: Ty, len: NodeId) -> SonResult<NodeId>;
    fn array_len(&mut self, ary: NodeId, elem: Ty) -> SonResult<NodeId>;
    fn array_load(&mut self, ary: NodeId, elem: Ty, index: NodeId) -> SonResult<NodeId>;
    fn array_store(&mut self, ary: NodeId, elem: Ty, index: NodeId, value: NodeId)
        -> SonResult<()>;
}

impl GraphBuilder {
    fn decl(&self, name: &str) -> SonResult<&StructDecl> {
        self.structs
            .get(name)
            .ok_or_else(|| SonError::semantic(format!("unknown struct '{name}'"), self.span))
    }

    fn array_field(&self, elem: Ty, field: &str) -> SonResult<FieldRef> {
        let name = self.graph.types.array_name(elem);
        self.field(&name, field)
    }

    /// Zero value of a field type: `0`, `0.0` or `null`.
    fn zero_of(&mut self, t: Ty) -> NodeId {
        let zero = if self.graph.types.is_float(t) {
            self.graph.types.float(0.0)
        } else if self.graph.types.is_ptr(t) {
            Ty::NULL
        } else {
            Ty::ZERO
        };
        self.graph.con(zero)
    }
}

impl ObjectBuilder for GraphBuilder {
    fn declare_struct(&mut self, name: &str, fields: &[(&str, Ty, bool)]) -> SonResult<Ty> {
        if self.structs.contains_key(name) {
            return Err(SonError::semantic(
                format!("struct '{name}' is already declared"),
                self.span,
            ));
        }
        let mut shape = Vec::with_capacity(fields.len());
        let mut refs = Vec::with_capacity(fields.len());
        for &(fname, ty, is_final) in fields {
            if shape.iter().any(|f: &Field| &*f.name == fname) {
                return Err(SonError::semantic(
                    format!("duplicate field '{fname}' in struct '{name}'"),
                    self.span,
                ));
            }
            let alias = self.graph.types.fresh_alias();
            self.add_alias_slot(alias)?;
            let fname: Arc<str> = fname.into();
            shape.push(Field {
                name: fname.clone(),
                ty,
                alias,
                is_final,
            });
            refs.push(FieldRef {
                name: fname,
                alias,
                declared: ty,
                is_final,
            });
        }
        let ty = self.graph.types.struct_type(name, shape);
        let ptr = self.ref_type(name, false);
        log::debug!("struct {name}: {} fields", refs.len());
        self.structs.insert(
            name.into(),
            StructDecl {
                ty,
                ptr,
                fields: refs.into(),
            },
        );
        Ok(ty)
    }

    fn ref_type(&mut self, name: &str, nullable: bool) -> Ty {
        let target = self.graph.types.struct_forward(name);
        self.graph.types.ptr(target, nullable)
    }

    fn field(&self, struct_name: &str, field: &str) -> SonResult<FieldRef> {
        self.decl(struct_name)?
            .fields
            .iter()
            .find(|f| &*f.name == field)
            .cloned()
            .ok_or_else(|| {
                SonError::semantic(
                    format!("struct '{struct_name}' has no field '{field}'"),
                    self.span,
                )
            })
    }

    fn new_struct(&mut self, name: &str) -> SonResult<NodeId> {
        let fields = self.decl(name)?.fields.clone();
        let mut inits = Vec::with_capacity(fields.len());
        for f in fields.iter() {
            let z = self.zero_of(f.declared);
            self.graph.keep(z);
            inits.push(z);
        }
        let ptr = self.new_struct_init(name, &inits);
        for z in inits {
            self.graph.unkeep(z);
        }
        ptr
    }

    fn new_struct_init(&mut self, name: &str, inits: &[NodeId]) -> SonResult<NodeId> {
        let decl = self.decl(name)?.clone();
        if inits.len() != decl.fields.len() {
            return Err(SonError::semantic(
                format!(
                    "struct '{name}' has {} fields but {} initial values were given",
                    decl.fields.len(),
                    inits.len()
                ),
                self.span,
            ));
        }
        let mut inputs = Vec::with_capacity(1 + 2 * inits.len());
        inputs.push(Some(self.ctrl()));
        for f in decl.fields.iter() {
            inputs.push(Some(self.mem(f.alias)?));
        }
        inputs.extend(inits.iter().map(|&v| Some(v)));

        let new = self.emit(Operator::Memory(MemoryOp::New(decl.ty)), &inputs);
        self.graph.keep(new);
        let ptr = self.emit(Operator::Proj(1), &[Some(new)]);
        self.graph.keep(ptr);
        let mut result = Ok(());
        for (i, f) in decl.fields.iter().enumerate() {
            let mem = self.emit(Operator::Proj(2 + i as u32), &[Some(new)]);
            if let Err(e) = self.set_mem(f.alias, mem) {
                result = Err(e);
                break;
            }
        }
        self.graph.unkeep(ptr);
        self.graph.unkeep(new);
        result.map(|()| ptr)
    }

    fn load(&mut self, ptr: NodeId, field: &FieldRef) -> SonResult<NodeId> {
        let mem = self.mem(field.alias)?;
        Ok(self.emit(
            Operator::Memory(MemoryOp::Load(field.clone())),
            &[None, Some(mem), Some(ptr)],
        ))
    }

    fn store(&mut self, ptr: NodeId, field: &FieldRef, value: NodeId) -> SonResult<()> {
        let mem = self.mem(field.alias)?;
        let ctrl = self.ctrl();
        let st = self.emit(
            Operator::Memory(MemoryOp::Store(field.clone())),
            &[Some(ctrl), Some(mem), Some(ptr), Some(value), None],
        );
        self.set_mem(field.alias, st)
    }

    fn declare_array(&mut self, elem: Ty) -> SonResult<Ty> {
        let name = self.graph.types.array_name(elem);
        if let Some(decl) = self.structs.get(name.as_str()) {
            return Ok(decl.ty);
        }
        let types = &self.graph.types;
        let problem = match types.as_ptr(elem) {
            Some(p) if p.nil != Nil::MaybeNil => Some("references in arrays must be nullable"),
            Some(_) => None,
            None if types.is_int(elem) || types.is_float(elem) => None,
            None => Some("array elements must be numbers or references"),
        };
        if let Some(problem) = problem {
            return Err(SonError::semantic(
                format!("cannot declare {name}: {problem}"),
                self.span,
            ));
        }
        let len_alias = self.graph.types.fresh_alias();
        self.add_alias_slot(len_alias)?;
        let body_alias = self.graph.types.fresh_alias();
        self.add_alias_slot(body_alias)?;
        let ty = self.graph.types.array_type(elem, len_alias, body_alias);
        let ptr = self.ref_type(&name, false);
        let fields = [
            (ARRAY_LEN, Ty::INT_BOT, true, len_alias),
            (ARRAY_BODY, elem, false, body_alias),
        ]
        .map(|(fname, declared, is_final, alias)| FieldRef {
            name: fname.into(),
            alias,
            declared,
            is_final,
        });
        log::debug!("array {name}: aliases #{len_alias} and #{body_alias}");
        self.structs.insert(
            name.into(),
            StructDecl {
                ty,
                ptr,
                fields: fields.into(),
            },
        );
        Ok(ty)
    }

    fn new_array(&mut self, elem: Ty, len: NodeId) -> SonResult<NodeId> {
        self.declare_array(elem)?;
        let name = self.graph.types.array_name(elem);
        self.graph.keep(len);
        let zero = self.zero_of(elem);
        self.graph.keep(zero);
        let ptr = self.new_struct_init(&name, &[len, zero]);
        self.graph.unkeep(zero);
        self.graph.unkeep(len);
        ptr
    }

    fn array_len(&mut self, ary: NodeId, elem: Ty) -> SonResult<NodeId> {
        let len = self.array_field(elem, ARRAY_LEN)?;
        self.load(ary, &len)
    }

    fn array_load(&mut self, ary: NodeId, elem: Ty, index: NodeId) -> SonResult<NodeId> {
        let body = self.array_field(elem, ARRAY_BODY)?;
        let mem = self.mem(body.alias)?;
        Ok(self.emit(
            Operator::Memory(MemoryOp::Load(body)),
            &[None, Some(mem), Some(ary), Some(index)],
        ))
    }

    fn array_store(
        &mut self,
        ary: NodeId,
        elem: Ty,
        index: NodeId,
        value: NodeId,
    ) -> SonResult<()> {
        let body = self.array_field(elem, ARRAY_BODY)?;
        let mem = self.mem(body.alias)?;
        let ctrl = self.ctrl();
        let alias = body.alias;
        let st = self.emit(
            Operator::Memory(MemoryOp::Store(body)),
            &[Some(ctrl), Some(mem), Some(ary), Some(value), Some(index)],
        );
        self.set_mem(alias, st)
    }
}
