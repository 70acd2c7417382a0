//! Scoped name lookup used while generating code.
//!
//! Class names and variable names live in separate namespaces, as do methods, which are
//! resolved through the dispatch table of the receiver's class and never through scopes.
//! Variable scopes nest strictly: class (fields, inherited ones included, nearest
//! declaration winning), method (parameters and locals), and any number of blocks. Lookup
//! walks outward from the innermost scope.

use super::{ClassId, MethodId, SymbolTable, VarId};
use crate::core::error::{CompileError, CompileResult};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Class(ClassId),
    Method(MethodId),
    Block,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    vars: HashMap<String, VarId>,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            vars: HashMap::new(),
        }
    }
}

/// Stack of lookup scopes for one compilation unit.
#[derive(Debug, Clone)]
pub struct SymbolContext {
    classes: HashMap<String, ClassId>,
    scopes: Vec<Scope>,
}

impl SymbolContext {
    /// A context holding only the global scope, with every class of `table` visible.
    pub fn new(table: &SymbolTable) -> Self {
        let classes = table
            .class_ids()
            .map(|class| (table.class(class).name.clone(), class))
            .collect();
        Self {
            classes,
            scopes: vec![Scope::new(ScopeKind::Global)],
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn enter(&mut self, kind: ScopeKind) -> &mut Scope {
        self.scopes.push(Scope::new(kind));
        log::trace!("enter scope {kind:?} (depth {})", self.scopes.len());
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    /// Enter a class: its fields, ancestors' included, become visible.
    pub fn enter_class(&mut self, table: &SymbolTable, class: ClassId) {
        let chain = table.ancestors(class);
        let scope = self.enter(ScopeKind::Class(class));
        // Root first so nearer declarations overwrite.
        for &c in chain.iter().rev() {
            for &field in &table.class(c).fields {
                scope.vars.insert(table.var(field).name.clone(), field);
            }
        }
    }

    /// Enter a method body: parameters and method-level locals become visible.
    pub fn enter_method(&mut self, table: &SymbolTable, method: MethodId) {
        let entry = table.method(method);
        let scope = self.enter(ScopeKind::Method(method));
        for &var in entry.params.iter().chain(&entry.locals) {
            scope.vars.insert(table.var(var).name.clone(), var);
        }
    }

    pub fn enter_block(&mut self) {
        self.enter(ScopeKind::Block);
    }

    /// Leave the innermost scope. The global scope is never left.
    pub fn exit(&mut self) -> CompileResult<()> {
        if self.scopes.len() <= 1 {
            return Err(CompileError::Layout {
                reason: "scope exit without matching enter".into(),
            });
        }
        self.scopes.pop();
        Ok(())
    }

    /// Declare variable `name` in the innermost scope.
    pub fn declare(&mut self, name: &str, var: VarId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.vars.insert(name.to_string(), var);
        }
    }

    pub fn lookup_var(&self, name: &str) -> CompileResult<VarId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.vars.get(name).copied())
            .ok_or_else(|| CompileError::UnresolvedSymbol {
                name: name.to_string(),
            })
    }

    pub fn lookup_class(&self, name: &str) -> CompileResult<ClassId> {
        self.classes
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnresolvedSymbol {
                name: name.to_string(),
            })
    }

    /// The innermost enclosing class, if any.
    pub fn current_class(&self) -> Option<ClassId> {
        self.scopes.iter().rev().find_map(|s| match s.kind {
            ScopeKind::Class(class) => Some(class),
            _ => None,
        })
    }

    /// The innermost enclosing method, if any.
    pub fn current_method(&self) -> Option<MethodId> {
        self.scopes.iter().rev().find_map(|s| match s.kind {
            ScopeKind::Method(method) => Some(method),
            _ => None,
        })
    }
}
