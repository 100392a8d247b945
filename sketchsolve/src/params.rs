//! Flat storage for every scalar the solver can see.

use crate::Id;

/// Owns the value of every parameter (point coordinates, radii, target distances, angles)
/// and whether each one is fixed.
///
/// Parameters are never removed individually. An [`Id`] stays valid until [`ParameterStore::clear`].
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    values: Vec<f64>,
    fixed: Vec<bool>,
}

impl ParameterStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new free parameter and return its index.
    pub fn push(&mut self, value: f64) -> Id {
        let id = self.values.len() as Id;
        self.values.push(value);
        self.fixed.push(false);
        id
    }

    /// Append a new fixed parameter and return its index.
    pub fn push_fixed(&mut self, value: f64) -> Id {
        let id = self.push(value);
        self.fixed[id as usize] = true;
        id
    }

    /// Current value of the parameter.
    ///
    /// # Panics
    /// If `id` was never pushed.
    pub fn get(&self, id: Id) -> f64 {
        self.values[id as usize]
    }

    /// Overwrite a parameter's value.
    /// Callers must not do this for fixed parameters; the solver never does.
    ///
    /// # Panics
    /// If `id` was never pushed.
    pub fn set(&mut self, id: Id, value: f64) {
        debug_assert!(
            !self.fixed[id as usize],
            "parameter {id} is fixed, it should not be overwritten"
        );
        self.values[id as usize] = value;
    }

    /// Exclude this parameter from the solver's free variables.
    pub fn mark_fixed(&mut self, id: Id) {
        self.fixed[id as usize] = true;
    }

    /// Let the solver change this parameter again.
    pub fn mark_free(&mut self, id: Id) {
        self.fixed[id as usize] = false;
    }

    /// Is this parameter excluded from solving?
    pub fn is_fixed(&self, id: Id) -> bool {
        self.fixed[id as usize]
    }

    /// Does this ID refer to a parameter in the store?
    pub fn contains(&self, id: Id) -> bool {
        (id as usize) < self.values.len()
    }

    /// How many parameters have ever been pushed (since the last clear).
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if nothing has been pushed.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Every value, indexed by [`Id`].
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Forget every parameter. All outstanding IDs become invalid.
    pub fn clear(&mut self) {
        self.values.clear();
        self.fixed.clear();
    }
}
