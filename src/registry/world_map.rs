use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// The world's location set and the paths between locations.
///
/// Distances are hop counts over the path graph; no geometry is involved.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorldMap {
    paths: BTreeMap<String, BTreeSet<String>>,
}

impl WorldMap {
    pub fn new<I, S>(locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: locations
                .into_iter()
                .map(|l| (l.into(), BTreeSet::new()))
                .collect(),
        }
    }

    /// Connect two locations (both directions); unknown locations are added
    pub fn with_path(mut self, a: &str, b: &str) -> Self {
        self.paths
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        self.paths
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());
        self
    }

    pub fn contains(&self, location: &str) -> bool {
        self.paths.contains_key(location)
    }

    pub fn locations(&self) -> Vec<String> {
        self.paths.keys().cloned().collect()
    }

    /// Locations at most `radius` hops from `origin` (origin included)
    pub fn within(&self, origin: &str, radius: usize) -> HashMap<String, usize> {
        let mut seen = HashMap::new();
        if !self.contains(origin) {
            return seen;
        }

        let mut queue = VecDeque::new();
        seen.insert(origin.to_string(), 0);
        queue.push_back(origin.to_string());

        while let Some(current) = queue.pop_front() {
            let depth = seen[&current];
            if depth == radius {
                continue;
            }
            if let Some(neighbours) = self.paths.get(&current) {
                for next in neighbours {
                    if !seen.contains_key(next) {
                        seen.insert(next.clone(), depth + 1);
                        queue.push_back(next.clone());
                    }
                }
            }
        }

        seen
    }

    /// Hop distance between two locations, None if unreachable
    pub fn distance(&self, from: &str, to: &str) -> Option<usize> {
        self.within(from, self.paths.len()).get(to).copied()
    }
}
