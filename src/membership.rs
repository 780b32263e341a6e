// ⚖️ Membership Reconciler - addenda → currently authorized identities
//
// Start from the empty set. For each addendum, in order: insert every `added`
// identity, then drop every `removed` identity (structural match on kind,
// value and name). Removing an absent identity is a no-op.
//
// The result depends on the order of the input; callers pass addenda exactly
// as the store lists them (creation time, then insertion sequence).

use crate::addendum::Addendum;
use crate::identity::Identity;
use std::collections::BTreeSet;
use tracing::trace;

/// The authorized roster of one agreement at a point in the addendum history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSet {
    members: BTreeSet<Identity>,
}

impl ActiveSet {
    pub fn new() -> Self {
        ActiveSet::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Exact structural membership
    pub fn contains(&self, identity: &Identity) -> bool {
        self.members.contains(identity)
    }

    /// Membership ignoring the display name
    pub fn contains_principal(&self, identity: &Identity) -> bool {
        self.members.iter().any(|m| m.same_principal(identity))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.members.iter()
    }

    pub fn into_vec(self) -> Vec<Identity> {
        self.members.into_iter().collect()
    }

    /// One reconciliation step. Consumes the previous set and returns the next
    /// one, so no set is ever shared while it is being changed.
    pub fn apply(self, addendum: &Addendum) -> ActiveSet {
        let mut members = self.members;
        members.extend(addendum.added().iter().cloned());
        for removed in addendum.removed() {
            members.remove(removed);
        }
        trace!(
            added = addendum.added().len(),
            removed = addendum.removed().len(),
            size = members.len(),
            "addendum applied"
        );
        ActiveSet { members }
    }
}

/// Fold an ordered addendum history into its active set.
pub fn reconcile<'a, I>(addenda: I) -> ActiveSet
where
    I: IntoIterator<Item = &'a Addendum>,
{
    addenda.into_iter().fold(ActiveSet::new(), ActiveSet::apply)
}
