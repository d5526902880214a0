use std::collections::HashMap;

use crate::ast::MacroDecl;

use super::types::Ty;

/// Index of a scope inside the arena shared by every module of a compilation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub ty: Ty,
    pub is_mutable: bool,
    pub is_initialized: bool,
}

#[derive(Default, Debug)]
pub struct Scope {
    parent: Option<ScopeId>,
    symbols: HashMap<String, Symbol>,
    types: HashMap<String, Ty>,
    macros: HashMap<String, MacroDecl>,
}

#[derive(Default, Debug)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent,
            ..Scope::default()
        });
        id
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.scopes[id.0 as usize].parent
    }

    // Same-scope redefinition overwrites; shadowing happens across scopes.
    pub fn define(&mut self, id: ScopeId, symbol: Symbol) {
        self.scopes[id.0 as usize]
            .symbols
            .insert(symbol.name.clone(), symbol);
    }

    pub fn define_type(&mut self, id: ScopeId, name: &str, ty: Ty) {
        self.scopes[id.0 as usize].types.insert(name.to_string(), ty);
    }

    pub fn define_macro(&mut self, id: ScopeId, name: &str, decl: MacroDecl) {
        self.scopes[id.0 as usize]
            .macros
            .insert(name.to_string(), decl);
    }

    pub fn resolve(&self, id: ScopeId, name: &str) -> Option<&Symbol> {
        let scope = &self.scopes[id.0 as usize];
        if let Some(sym) = scope.symbols.get(name) {
            return Some(sym);
        }
        scope.parent.and_then(|p| self.resolve(p, name))
    }

    pub fn resolve_type(&self, id: ScopeId, name: &str) -> Option<&Ty> {
        let scope = &self.scopes[id.0 as usize];
        if let Some(ty) = scope.types.get(name) {
            return Some(ty);
        }
        scope.parent.and_then(|p| self.resolve_type(p, name))
    }

    pub fn resolve_macro(&self, id: ScopeId, name: &str) -> Option<&MacroDecl> {
        let scope = &self.scopes[id.0 as usize];
        if let Some(decl) = scope.macros.get(name) {
            return Some(decl);
        }
        scope.parent.and_then(|p| self.resolve_macro(p, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str, ty: Ty) -> Symbol {
        Symbol {
            name: name.to_string(),
            ty,
            is_mutable: false,
            is_initialized: true,
        }
    }

    #[test]
    fn lookup_walks_parent_chain() {
        let mut arena = ScopeArena::new();
        let outer = arena.alloc(None);
        let inner = arena.alloc(Some(outer));
        arena.define(outer, sym("x", Ty::Primitive("int".to_string())));

        assert!(arena.resolve(inner, "x").is_some());
        assert!(arena.resolve(inner, "y").is_none());
    }

    #[test]
    fn inner_definition_shadows_outer() {
        let mut arena = ScopeArena::new();
        let outer = arena.alloc(None);
        let inner = arena.alloc(Some(outer));
        arena.define(outer, sym("x", Ty::Primitive("int".to_string())));
        arena.define(inner, sym("x", Ty::Primitive("float".to_string())));

        let found = arena.resolve(inner, "x").unwrap();
        assert_eq!(found.ty.to_string(), "float");
        let outer_found = arena.resolve(outer, "x").unwrap();
        assert_eq!(outer_found.ty.to_string(), "int");
    }

    #[test]
    fn same_scope_redefinition_overwrites() {
        let mut arena = ScopeArena::new();
        let scope = arena.alloc(None);
        arena.define(scope, sym("x", Ty::Primitive("int".to_string())));
        arena.define(scope, sym("x", Ty::Primitive("string".to_string())));

        assert_eq!(arena.resolve(scope, "x").unwrap().ty.to_string(), "string");
    }
}
