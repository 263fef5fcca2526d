//! Dependency ordering within a batch.

use std::collections::{BTreeSet, HashMap};

use super::ResourceLoader;
use crate::error::{PlanError, Result};
use crate::schema::ResourceKind;

impl<K: ResourceKind> ResourceLoader<K> {
    /// Orders a batch so that every resource comes after the in-batch
    /// resources it depends on.
    ///
    /// Dependencies outside the batch are treated as satisfied. Independent
    /// resources keep their input order.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::DependencyCycle`] if the in-batch dependencies
    /// form a cycle.
    pub fn sort_by_dependencies(items: &[K::Write]) -> Result<Vec<K::Write>> {
        let index: HashMap<K::Id, usize> = items
            .iter()
            .enumerate()
            .map(|(i, item)| (K::write_id(item), i))
            .collect();

        let mut in_degree = vec![0usize; items.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
        for (i, item) in items.iter().enumerate() {
            let required: BTreeSet<usize> = K::dependencies(item)
                .iter()
                .filter_map(|dep| index.get(dep).copied())
                .collect();
            for dep in required {
                in_degree[i] += 1;
                dependents[dep].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..items.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut sorted = Vec::with_capacity(items.len());
        while let Some(next) = ready.pop_first() {
            sorted.push(items[next].clone());
            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if sorted.len() < items.len() {
            let mut cycle: Vec<String> = (0..items.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| K::write_id(&items[i]).to_string())
                .collect();
            cycle.sort();
            return Err(PlanError::DependencyCycle {
                kind: K::NAME.to_string(),
                cycle: cycle.join(", "),
            }
            .into());
        }

        Ok(sorted)
    }
}
