//! # Hierarchy Resolver
//!
//! Expands selected roots into the records that must carry the same removal
//! time. Resolution reads the live hierarchy on every call; results are never
//! cached across job attempts.
//!
//! The closure walk uses an explicit queue and a visited set, so malformed
//! hierarchies with cycles still terminate.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::database::HistoryReader;
use crate::error::Result;
use crate::models::{EntityRef, HistoricRoot, RecordKind};

/// Place of an entity under its root. Writes run in this order, so the root
/// only changes after everything attached to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetRole {
    Dependent,
    Owner,
    Root,
}

/// Everything attached to one selected root
#[derive(Debug, Clone, PartialEq)]
pub struct RootTargets {
    pub root: HistoricRoot,
    /// Owning records reached through the hierarchy, excluding the root
    pub owners: BTreeSet<EntityRef>,
    /// Leaf records of the root and of every owner
    pub dependents: BTreeSet<EntityRef>,
}

impl RootTargets {
    pub fn entity_count(&self) -> usize {
        1 + self.owners.len() + self.dependents.len()
    }

    /// Every entity with its role, dependents first and the root last
    pub fn entities(&self) -> impl Iterator<Item = (TargetRole, &EntityRef)> {
        self.dependents
            .iter()
            .map(|entity| (TargetRole::Dependent, entity))
            .chain(self.owners.iter().map(|entity| (TargetRole::Owner, entity)))
            .chain(std::iter::once((TargetRole::Root, &self.root.entity)))
    }
}

/// Resolved, deduplicated targets of one job attempt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetSet {
    pub roots: Vec<RootTargets>,
}

impl TargetSet {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.roots.iter().map(RootTargets::entity_count).sum()
    }
}

#[derive(Debug, Clone)]
pub struct HierarchyResolver {
    reader: Arc<dyn HistoryReader>,
    include_authorizations: bool,
}

impl HierarchyResolver {
    pub fn new(reader: Arc<dyn HistoryReader>, include_authorizations: bool) -> Self {
        Self {
            reader,
            include_authorizations,
        }
    }

    /// Resolve every root. Roots that no longer exist are skipped; an entity
    /// reachable from two roots is attributed to the first one only.
    #[instrument(skip(self, roots), fields(root_count = roots.len()))]
    pub async fn resolve(&self, roots: &[EntityRef], hierarchical: bool) -> Result<TargetSet> {
        let mut claimed: HashSet<EntityRef> = HashSet::new();
        let mut resolved = Vec::with_capacity(roots.len());

        for root in roots {
            let Some(metadata) = self.reader.find_root(root).await? else {
                debug!(root = %root, "Root no longer exists, nothing to resolve");
                continue;
            };
            if !claimed.insert(root.clone()) {
                continue;
            }

            let targets = self.resolve_root(metadata, hierarchical, &mut claimed).await?;
            resolved.push(targets);
        }

        let targets = TargetSet { roots: resolved };
        debug!(target_count = targets.len(), "Resolved target set");
        Ok(targets)
    }

    async fn resolve_root(
        &self,
        root: HistoricRoot,
        hierarchical: bool,
        claimed: &mut HashSet<EntityRef>,
    ) -> Result<RootTargets> {
        let mut owners = BTreeSet::new();
        let mut dependents = BTreeSet::new();
        let mut queue = VecDeque::from([root.entity.clone()]);

        while let Some(owner) = queue.pop_front() {
            for dependent in self.reader.dependents_of(&owner).await? {
                if dependent.kind == RecordKind::Authorization && !self.include_authorizations {
                    continue;
                }
                if claimed.insert(dependent.clone()) {
                    dependents.insert(dependent);
                }
            }

            if !hierarchical {
                continue;
            }

            for edge in self.reader.child_edges(&owner).await? {
                if claimed.insert(edge.child.clone()) {
                    owners.insert(edge.child.clone());
                    queue.push_back(edge.child);
                }
            }
        }

        Ok(RootTargets {
            root,
            owners,
            dependents,
        })
    }
}
