use std::collections::HashMap;
use std::fmt;

use crate::ast::BinOp;

use super::scope::ScopeId;

#[derive(Clone, Debug)]
pub enum Ty {
    Primitive(String),
    Pointer(Box<Ty>),
    Array {
        elem: Box<Ty>,
        fixed: bool,
    },
    Generic {
        name: String,
        constraint: Option<Box<Ty>>,
    },
    Function(FnTy),
    Struct(StructTy),
    SelfTy(Box<Ty>),
    Namespace {
        name: String,
        scope: ScopeId,
    },
}

#[derive(Clone, Debug)]
pub struct FnTy {
    pub params: Vec<Ty>,
    pub ret: Box<Ty>,
    pub vararg: bool,
}

#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub ty: Ty,
    pub is_public: bool,
}

#[derive(Clone, Debug)]
pub struct StructTy {
    pub name: String,
    pub generic_args: Vec<Ty>,
    pub parents: Vec<Ty>,
    pub is_interface: bool,
    pub fields: HashMap<String, FieldInfo>,
    pub methods: HashMap<String, Ty>,
    pub operators: HashMap<BinOp, Ty>,
    pub constructors: Vec<FnTy>,
    pub has_destructor: bool,
}

impl Ty {
    pub fn primitive(name: &str) -> Ty {
        Ty::Primitive(name.to_string())
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Ty::Primitive(name) if name == "void")
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Ty::Primitive(name) if name == "auto")
    }

    /// Strict structural equality. Structs compare by name and generic
    /// arguments only, never by their member registries.
    pub fn equals(&self, other: &Ty) -> bool {
        match (self, other) {
            (Ty::Primitive(a), Ty::Primitive(b)) => a == b,
            (Ty::Pointer(a), Ty::Pointer(b)) => a.equals(b),
            (
                Ty::Array { elem: a, fixed: fa },
                Ty::Array { elem: b, fixed: fb },
            ) => fa == fb && a.equals(b),
            (Ty::Generic { name: a, .. }, Ty::Generic { name: b, .. }) => a == b,
            (Ty::Function(a), Ty::Function(b)) => a.equals(b),
            (Ty::Struct(a), Ty::Struct(b)) => a.same_instantiation(b),
            (Ty::SelfTy(_), Ty::SelfTy(_)) => true,
            (Ty::Namespace { name: a, .. }, Ty::Namespace { name: b, .. }) => a == b,
            _ => false,
        }
    }

    /// The implicit-conversion relation used for initializers, arguments,
    /// and returns.
    pub fn is_assignable_to(&self, other: &Ty) -> bool {
        if let Ty::SelfTy(original) = self {
            return original.is_assignable_to(other);
        }
        if self.equals(other) {
            return true;
        }
        if other.is_auto() {
            return true;
        }
        if matches!(other, Ty::Generic { .. }) {
            return true;
        }
        match (self, other) {
            (Ty::Primitive(a), Ty::Primitive(b)) => a == "int" && b == "float",
            (Ty::Pointer(pointee), Ty::Pointer(other_pointee)) => {
                // &void covers both the null literal and void* targets.
                pointee.is_void()
                    || other_pointee.is_void()
                    || pointee.is_assignable_to(other_pointee)
            }
            (
                Ty::Array { elem, fixed },
                Ty::Array {
                    elem: other_elem,
                    fixed: other_fixed,
                },
            ) => *fixed && !*other_fixed && elem.is_assignable_to(other_elem),
            _ => false,
        }
    }

    /// The looser relation checked only for explicit cast expressions.
    pub fn is_castable_to(&self, other: &Ty) -> bool {
        if self.equals(other) {
            return true;
        }
        if matches!(self, Ty::Generic { .. }) || matches!(other, Ty::Generic { .. }) {
            return true;
        }
        match (self, other) {
            (Ty::Primitive(_), Ty::Primitive(_)) => true,
            (Ty::Pointer(_), Ty::Pointer(_)) => true,
            (Ty::Pointer(_), Ty::Primitive(name)) => {
                matches!(name.as_str(), "int" | "long" | "ulong")
            }
            _ => false,
        }
    }

    /// Replaces every generic parameter named in the mapping, recursing
    /// through all nested types.
    pub fn substitute(&self, mapping: &HashMap<String, Ty>) -> Ty {
        match self {
            Ty::Primitive(_) | Ty::Namespace { .. } => self.clone(),
            Ty::Pointer(pointee) => Ty::Pointer(Box::new(pointee.substitute(mapping))),
            Ty::Array { elem, fixed } => Ty::Array {
                elem: Box::new(elem.substitute(mapping)),
                fixed: *fixed,
            },
            Ty::Generic { name, constraint } => {
                if let Some(replacement) = mapping.get(name) {
                    replacement.clone()
                } else {
                    Ty::Generic {
                        name: name.clone(),
                        constraint: constraint
                            .as_ref()
                            .map(|c| Box::new(c.substitute(mapping))),
                    }
                }
            }
            Ty::Function(sig) => Ty::Function(sig.substitute(mapping)),
            Ty::Struct(s) => Ty::Struct(s.substitute(mapping)),
            Ty::SelfTy(original) => Ty::SelfTy(Box::new(original.substitute(mapping))),
        }
    }

    /// Peels `Pointer`, `Self`, and constrained `Generic` wrappers down to a
    /// struct, if one is underneath.
    pub fn unwrap_struct(&self) -> Option<&StructTy> {
        match self {
            Ty::Struct(s) => Some(s),
            Ty::Pointer(inner) | Ty::SelfTy(inner) => inner.unwrap_struct(),
            Ty::Generic {
                constraint: Some(c),
                ..
            } => c.unwrap_struct(),
            _ => None,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Primitive(name) => write!(f, "{name}"),
            Ty::Pointer(pointee) => write!(f, "&{pointee}"),
            Ty::Array { elem, fixed } => {
                if *fixed {
                    write!(f, "[{elem}; fixed]")
                } else {
                    write!(f, "[{elem}]")
                }
            }
            Ty::Generic { name, .. } => write!(f, "{name}"),
            Ty::Function(sig) => {
                write!(f, "fun(")?;
                for (i, param) in sig.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                if sig.vararg {
                    if !sig.params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ") -> {}", sig.ret)
            }
            Ty::Struct(s) => {
                write!(f, "{}", s.name)?;
                if !s.generic_args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in s.generic_args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            Ty::SelfTy(_) => write!(f, "Self"),
            Ty::Namespace { name, .. } => write!(f, "module<{name}>"),
        }
    }
}

impl FnTy {
    pub fn new(params: Vec<Ty>, ret: Ty) -> Self {
        Self {
            params,
            ret: Box::new(ret),
            vararg: false,
        }
    }

    pub fn equals(&self, other: &FnTy) -> bool {
        self.vararg == other.vararg && self.ret.equals(&other.ret) && self.params_equal(other)
    }

    pub fn params_equal(&self, other: &FnTy) -> bool {
        self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(other.params.iter())
                .all(|(a, b)| a.equals(b))
    }

    pub fn substitute(&self, mapping: &HashMap<String, Ty>) -> FnTy {
        FnTy {
            params: self.params.iter().map(|p| p.substitute(mapping)).collect(),
            ret: Box::new(self.ret.substitute(mapping)),
            vararg: self.vararg,
        }
    }
}

impl StructTy {
    pub fn new(name: &str) -> Self {
        Self::with_args(name, Vec::new())
    }

    pub fn with_args(name: &str, generic_args: Vec<Ty>) -> Self {
        Self {
            name: name.to_string(),
            generic_args,
            parents: Vec::new(),
            is_interface: false,
            fields: HashMap::new(),
            methods: HashMap::new(),
            operators: HashMap::new(),
            constructors: Vec::new(),
            has_destructor: false,
        }
    }

    /// Name and generic arguments without the member registries. Sufficient
    /// wherever only identity matters (constructor returns, comparisons).
    pub fn head(&self) -> StructTy {
        let mut head = StructTy::with_args(&self.name, self.generic_args.clone());
        head.is_interface = self.is_interface;
        head
    }

    pub fn same_instantiation(&self, other: &StructTy) -> bool {
        self.name == other.name
            && self.generic_args.len() == other.generic_args.len()
            && self
                .generic_args
                .iter()
                .zip(other.generic_args.iter())
                .all(|(a, b)| a.equals(b))
    }

    pub fn define_field(&mut self, name: &str, ty: Ty, is_public: bool) {
        self.fields
            .insert(name.to_string(), FieldInfo { ty, is_public });
    }

    pub fn define_method(&mut self, name: &str, ret: Ty) {
        self.methods.insert(name.to_string(), ret);
    }

    pub fn define_operator(&mut self, op: BinOp, ret: Ty) {
        self.operators.insert(op, ret);
    }

    pub fn add_constructor(&mut self, sig: FnTy) {
        self.constructors.push(sig);
    }

    /// Finds a field through the inheritance chain; returns the declaring
    /// struct alongside the field so visibility can be checked against the
    /// owner.
    pub fn field(&self, name: &str) -> Option<(&StructTy, &FieldInfo)> {
        if let Some(info) = self.fields.get(name) {
            return Some((self, info));
        }
        for parent in &self.parents {
            if let Ty::Struct(p) = parent {
                if let Some(found) = p.field(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn method_ret(&self, name: &str) -> Option<&Ty> {
        if let Some(ret) = self.methods.get(name) {
            return Some(ret);
        }
        for parent in &self.parents {
            if let Ty::Struct(p) = parent {
                if let Some(ret) = p.method_ret(name) {
                    return Some(ret);
                }
            }
        }
        None
    }

    pub fn operator_ret(&self, op: BinOp) -> Option<&Ty> {
        self.operators.get(&op)
    }

    pub fn substitute(&self, mapping: &HashMap<String, Ty>) -> StructTy {
        let mut out = StructTy::with_args(
            &self.name,
            self.generic_args
                .iter()
                .map(|a| a.substitute(mapping))
                .collect(),
        );
        for (name, info) in &self.fields {
            out.define_field(name, info.ty.substitute(mapping), info.is_public);
        }
        for (name, ret) in &self.methods {
            out.define_method(name, ret.substitute(mapping));
        }
        for (op, ret) in &self.operators {
            out.define_operator(*op, ret.substitute(mapping));
        }
        for parent in &self.parents {
            out.parents.push(parent.substitute(mapping));
        }
        for ctor in &self.constructors {
            out.add_constructor(ctor.substitute(mapping));
        }
        out.is_interface = self.is_interface;
        out.has_destructor = self.has_destructor;
        out
    }

    /// Pairs each declared generic parameter with a concrete argument and
    /// substitutes throughout. Fails on an argument-count mismatch.
    pub fn instantiate(&self, concrete_args: &[Ty]) -> Option<StructTy> {
        if concrete_args.len() != self.generic_args.len() {
            return None;
        }
        let mut mapping = HashMap::new();
        for (param, arg) in self.generic_args.iter().zip(concrete_args.iter()) {
            mapping.insert(param.to_string(), arg.clone());
        }
        Some(self.substitute(&mapping))
    }

    /// Structural conformance: every interface method and operator must be
    /// present by name, constructor requirements by parameter list, and a
    /// destructor requirement by flag.
    pub fn implements(&self, interface: &StructTy) -> bool {
        for name in interface.methods.keys() {
            if !self.methods.contains_key(name) {
                return false;
            }
        }
        for op in interface.operators.keys() {
            if !self.operators.contains_key(op) {
                return false;
            }
        }
        if interface.has_destructor && !self.has_destructor {
            return false;
        }
        for iface_ctor in &interface.constructors {
            if !self
                .constructors
                .iter()
                .any(|ctor| ctor.params_equal(iface_ctor))
            {
                return false;
            }
        }
        true
    }
}
