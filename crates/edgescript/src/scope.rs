//! Compile-time variable scopes.
//!
//! Scopes form a tree anchored at a module's global scope and exist only
//! while the AST is being built. Every variable declaration is assigned a
//! [`StackLocation`], the `(module, function, variable)` triple that is the
//! sole coordinate for variable access at run time; there is no name lookup
//! on the hot path.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{RunResult, ScriptError};

/// Addresses one variable cell at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackLocation {
    pub module: u32,
    pub function: u32,
    pub var: u32,
}

/// Index of a scope within its module's [`ScopeSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(u32);

#[derive(Debug)]
struct ScopeData {
    parent: Option<ScopeId>,
    /// Function index of the nearest enclosing function scope.
    function: u32,
    names: AHashMap<String, u32>,
}

/// All scopes of one module, arena-style.
///
/// Each function index owns a shared variable counter: every non-function
/// child scope of that function allocates frame slots from the same counter,
/// so the frame size is known once parsing finishes. Function definitions
/// keep a clone of their counter and read it at call time.
#[derive(Debug)]
pub struct ScopeSet {
    module: u32,
    scopes: Vec<ScopeData>,
    /// Frame-slot counters, indexed by function index.
    var_counts: Vec<Arc<AtomicU32>>,
}

impl ScopeSet {
    /// Creates the module's scope set with the global scope at id 0,
    /// function index 0.
    pub fn new(module: u32) -> Self {
        Self {
            module,
            scopes: vec![ScopeData {
                parent: None,
                function: 0,
                names: AHashMap::new(),
            }],
            var_counts: vec![Arc::new(AtomicU32::new(0))],
        }
    }

    pub fn module(&self) -> u32 {
        self.module
    }

    pub fn global(&self) -> ScopeId {
        ScopeId(0)
    }

    fn data(&self, id: ScopeId) -> &ScopeData {
        &self.scopes[id.0 as usize]
    }

    /// Child scope sharing the enclosing function's frame.
    pub fn add_scope(&mut self, parent: ScopeId) -> ScopeId {
        let function = self.data(parent).function;
        self.scopes.push(ScopeData {
            parent: Some(parent),
            function,
            names: AHashMap::new(),
        });
        ScopeId(self.scopes.len() as u32 - 1)
    }

    /// Child scope starting a new function: fresh function index, fresh
    /// frame-slot counter.
    pub fn add_function_scope(&mut self, parent: ScopeId) -> ScopeId {
        let function = self.var_counts.len() as u32;
        self.var_counts.push(Arc::new(AtomicU32::new(0)));
        self.scopes.push(ScopeData {
            parent: Some(parent),
            function,
            names: AHashMap::new(),
        });
        ScopeId(self.scopes.len() as u32 - 1)
    }

    pub fn function_of(&self, scope: ScopeId) -> u32 {
        self.data(scope).function
    }

    /// The frame-slot counter of a function, cloned into function defs.
    pub fn var_counter(&self, function: u32) -> Arc<AtomicU32> {
        Arc::clone(&self.var_counts[function as usize])
    }

    /// Declares a variable in `scope`; redeclaration within one scope fails.
    pub fn add_variable(&mut self, scope: ScopeId, name: &str) -> RunResult<StackLocation> {
        let function = self.data(scope).function;
        let data = &mut self.scopes[scope.0 as usize];
        if data.names.contains_key(name) {
            return Err(ScriptError::argument(format!(
                "Trying to add same variable in scope={name}"
            )));
        }
        let var = self.var_counts[function as usize].fetch_add(1, Ordering::Relaxed);
        data.names.insert(name.to_owned(), var);
        Ok(StackLocation {
            module: self.module,
            function,
            var,
        })
    }

    /// Resolves a read by walking up the scope chain to the module root.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<StackLocation> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let data = self.data(id);
            if let Some(&var) = data.names.get(name) {
                return Some(StackLocation {
                    module: self.module,
                    function: data.function,
                    var,
                });
            }
            current = data.parent;
        }
        None
    }

    /// Every `(name, location)` declared directly in `scope`, used when a
    /// class body copies its bindings into the class member table.
    pub fn locations_in_scope(&self, scope: ScopeId) -> Vec<(String, StackLocation)> {
        let data = self.data(scope);
        data.names
            .iter()
            .map(|(name, &var)| {
                (
                    name.clone(),
                    StackLocation {
                        module: self.module,
                        function: data.function,
                        var,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_scopes_share_the_function_frame() {
        let mut scopes = ScopeSet::new(0);
        let global = scopes.global();
        let a = scopes.add_variable(global, "a").unwrap();
        let inner = scopes.add_scope(global);
        let b = scopes.add_variable(inner, "b").unwrap();
        assert_eq!(a.function, 0);
        assert_eq!(b.function, 0);
        assert_ne!(a.var, b.var);
        assert_eq!(scopes.var_counter(0).load(Ordering::Relaxed), 2);
    }

    #[test]
    fn function_scopes_get_fresh_indices_and_counters() {
        let mut scopes = ScopeSet::new(2);
        let global = scopes.global();
        let f1 = scopes.add_function_scope(global);
        let f2 = scopes.add_function_scope(global);
        let x = scopes.add_variable(f1, "x").unwrap();
        let y = scopes.add_variable(f2, "y").unwrap();
        assert_eq!(x.function, 1);
        assert_eq!(y.function, 2);
        assert_eq!(x.var, 0);
        assert_eq!(y.var, 0);
        assert_eq!(x.module, 2);
    }

    #[test]
    fn lookup_walks_to_the_root() {
        let mut scopes = ScopeSet::new(0);
        let global = scopes.global();
        let loc = scopes.add_variable(global, "g").unwrap();
        let f = scopes.add_function_scope(global);
        let inner = scopes.add_scope(f);
        assert_eq!(scopes.lookup(inner, "g"), Some(loc));
        assert_eq!(scopes.lookup(inner, "missing"), None);
    }

    #[test]
    fn duplicate_declaration_in_scope_fails() {
        let mut scopes = ScopeSet::new(0);
        let global = scopes.global();
        scopes.add_variable(global, "x").unwrap();
        assert!(scopes.add_variable(global, "x").is_err());
    }
}
