//! Clustering archives into user groups by shared identifiers
//!
//! Two archives belong to the same [`UserGroup`] iff a chain of shared
//! identifiers connects them. The clustering is a disjoint-set (union-find)
//! pass over the identifier index: near-linear in the total number of
//! identifiers, and independent of input order.
//!
//! Timestamps play no part here. An archive with no identifiers is always a
//! singleton group.

use crate::types::{Identifier, UserGroup};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Disjoint-set forest with path compression and union by rank.
#[derive(Debug)]
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Groups archives by identifier overlap.
#[derive(Debug, Default)]
pub struct Grouper {
    archives: BTreeMap<String, BTreeSet<Identifier>>,
}

impl Grouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an archive and its identifiers. Adding the same path twice
    /// merges the identifier sets.
    pub fn add(&mut self, relative_path: impl Into<String>, identifiers: BTreeSet<Identifier>) {
        self.archives
            .entry(relative_path.into())
            .or_default()
            .extend(identifiers);
    }

    pub fn len(&self) -> usize {
        self.archives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }

    /// Compute the groups.
    ///
    /// Output is deterministic: archives inside a group are sorted, and groups
    /// are sorted by their first archive.
    pub fn group(self) -> Vec<UserGroup> {
        let paths: Vec<&String> = self.archives.keys().collect();
        let mut sets = DisjointSet::new(paths.len());

        let mut first_owner: HashMap<&str, usize> = HashMap::new();
        for (index, identifiers) in self.archives.values().enumerate() {
            for id in identifiers {
                match first_owner.get(id.as_str()) {
                    Some(&owner) => sets.union(owner, index),
                    None => {
                        first_owner.insert(id.as_str(), index);
                    }
                }
            }
        }

        // Roots are visited in path order, so groups come out sorted by first archive.
        let mut by_root: BTreeMap<usize, usize> = BTreeMap::new();
        let mut groups: Vec<UserGroup> = Vec::new();
        for (index, identifiers) in self.archives.values().enumerate() {
            let root = sets.find(index);
            let slot = *by_root.entry(root).or_insert_with(|| {
                groups.push(UserGroup {
                    archives: Vec::new(),
                    identifiers: BTreeSet::new(),
                });
                groups.len() - 1
            });
            let group = &mut groups[slot];
            group.archives.push(paths[index].clone());
            group.identifiers.extend(identifiers.iter().cloned());
        }

        tracing::debug!(
            archives = paths.len(),
            groups = groups.len(),
            "Grouped archives"
        );
        groups
    }
}

/// Convenience wrapper over [`Grouper`].
pub fn group_archives<I>(archives: I) -> Vec<UserGroup>
where
    I: IntoIterator<Item = (String, BTreeSet<Identifier>)>,
{
    let mut grouper = Grouper::new();
    for (path, identifiers) in archives {
        grouper.add(path, identifiers);
    }
    grouper.group()
}
