/// The ID of a parameter, i.e. one scalar variable whose value
/// is stored in the [`crate::ParameterStore`] and could be found by the solver.
pub type Id = u32;

/// Stable identifier of a primitive (point, line, circle, arc) or constraint
/// in a [`crate::Registry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct EntityId(pub u32);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for EntityId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Generates an incrementing sequence of entity IDs starting from 0.
/// IDs that were claimed explicitly are skipped over.
#[derive(Default, Debug, Clone)]
pub(crate) struct IdGenerator {
    next: u32,
    /// Set once `u32::MAX` has been handed out or claimed.
    exhausted: bool,
}

impl IdGenerator {
    /// None once the sequence has run past `u32::MAX`.
    pub fn next_id(&mut self) -> Option<EntityId> {
        let out = self.peek()?;
        self.claim(out);
        Some(out)
    }

    /// The ID [`IdGenerator::next_id`] would return, without consuming it.
    pub fn peek(&self) -> Option<EntityId> {
        (!self.exhausted).then_some(EntityId(self.next))
    }

    /// Make sure this ID is never handed out by [`IdGenerator::next_id`].
    pub fn claim(&mut self, id: EntityId) {
        match id.0.checked_add(1) {
            Some(after) => self.next = self.next.max(after),
            None => self.exhausted = true,
        }
    }
}
