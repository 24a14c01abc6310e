//! Load-order resolution.
//!
//! Builds a directed graph where an edge `A -> B` means "A loads before B":
//!
//! | declared on X     | edge     |
//! |-------------------|----------|
//! | `required` Y      | `Y -> X` |
//! | `optional` Y      | `Y -> X` |
//! | `before` Y        | `X -> Y` |
//! | `after` Y         | `Y -> X` |
//! | `incompatible` Y  | none     |
//!
//! Only `required` insists on presence; every other declaration against an
//! absent mod adds no edge. `incompatible` keeps the declaring mod out when
//! its target is present. The graph is sorted with Kahn's algorithm, taking
//! ready mods by ascending `load_priority`, then ascending namespace, so a
//! given set of descriptors always produces the same order.
//!
//! [`ResolveOptions`] adds two refinements used by the lifecycle manager: a
//! preferred order that ranks ready mods ahead of priority, and a set of
//! already loaded mods that satisfy dependencies without being reordered.

use crate::descriptor::{DependencyKind, ModDescriptor};
use crate::error::ResolveError;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet, VecDeque};
use tracing::debug;

/// A mod left out of a best-effort resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    pub namespace: String,
    pub error: ResolveError,
}

/// Outcome of [`resolve_best_effort`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Mods in load order.
    pub order: Vec<ModDescriptor>,

    /// Mods that could not be placed, each with its own reason.
    pub excluded: Vec<Exclusion>,
}

impl Resolution {
    /// Namespaces in load order.
    pub fn namespaces(&self) -> Vec<String> {
        self.order.iter().map(|d| d.namespace.clone()).collect()
    }
}

/// Extra inputs for [`resolve_best_effort_with`].
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Namespaces to place as early as the dependency rules allow, in this
    /// order. Mods not listed follow every listed one that is ready.
    pub preferred: Vec<String>,

    /// Mods already loaded. They satisfy `required` dependencies and their
    /// `incompatible` declarations are honoured, but they are not ordered.
    pub loaded: Vec<ModDescriptor>,
}

impl ResolveOptions {
    pub fn with_preferred(mut self, preferred: Vec<String>) -> Self {
        self.preferred = preferred;
        self
    }

    pub fn with_loaded(mut self, loaded: Vec<ModDescriptor>) -> Self {
        self.loaded = loaded;
        self
    }
}

/// Mods picked by [`select_enabled`].
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Enabled mods and everything they require, in input order.
    pub descriptors: Vec<ModDescriptor>,

    /// Enabled namespaces that matched no descriptor.
    pub unknown: Vec<String>,
}

/// Pick the enabled mods plus everything they transitively `require`.
///
/// Required dependencies that are missing from `descriptors` are left for the
/// resolver to report against their dependents.
pub fn select_enabled(descriptors: &[ModDescriptor], enabled: &[String]) -> Selection {
    let mut index: HashMap<&str, &ModDescriptor> = HashMap::new();
    for descriptor in descriptors {
        index.entry(descriptor.namespace.as_str()).or_insert(descriptor);
    }

    let mut unknown = Vec::new();
    let mut included: HashSet<&str> = HashSet::new();
    let mut pending: Vec<&str> = enabled.iter().rev().map(String::as_str).collect();

    while let Some(namespace) = pending.pop() {
        let Some(descriptor) = index.get(namespace) else {
            if enabled.iter().any(|e| e == namespace) && !unknown.iter().any(|u| u == namespace) {
                unknown.push(namespace.to_string());
            }
            continue;
        };
        if included.insert(namespace) {
            pending.extend(descriptor.required_dependencies());
        }
    }

    Selection {
        descriptors: descriptors
            .iter()
            .filter(|d| included.contains(d.namespace.as_str()))
            .cloned()
            .collect(),
        unknown,
    }
}

/// Resolve a complete load order, failing on the first problem.
pub fn resolve(descriptors: &[ModDescriptor]) -> Result<Vec<ModDescriptor>, ResolveError> {
    let mut index = BTreeMap::new();
    for descriptor in descriptors {
        if index
            .insert(descriptor.namespace.as_str(), descriptor)
            .is_some()
        {
            return Err(ResolveError::DuplicateNamespace(
                descriptor.namespace.clone(),
            ));
        }
    }

    for descriptor in index.values() {
        if let Some(target) = conflict_of(descriptor, &index, &[]) {
            return Err(ResolveError::Incompatible {
                namespace: descriptor.namespace.clone(),
                conflicts_with: target,
            });
        }
    }

    let loaded = BTreeSet::new();
    if let Some((dependent, dependency)) = missing_dependencies(&index, &loaded).into_iter().next() {
        return Err(ResolveError::MissingDependency {
            dependent: dependent.to_string(),
            dependency: dependency.to_string(),
        });
    }

    let graph = DependencyGraph::build(&index, &[]);
    match graph.topological_order() {
        Ok(order) => {
            debug!("Resolved load order: {:?}", order);
            Ok(order.into_iter().map(|ns| graph.nodes[ns].clone()).collect())
        }
        Err(remaining) => Err(ResolveError::DependencyCycle {
            cycle: graph.shortest_cycle(&remaining),
        }),
    }
}

/// Resolve as many mods as possible.
///
/// Duplicates (after the first), mods declaring a conflict with a present
/// mod, mods with missing `required` dependencies (cascading to their own
/// dependents) and mods on a cycle are excluded and reported one by one; the
/// rest are ordered exactly as [`resolve`] would.
pub fn resolve_best_effort(descriptors: &[ModDescriptor]) -> Resolution {
    resolve_best_effort_with(descriptors, &ResolveOptions::default())
}

/// [`resolve_best_effort`] with a preferred order and already loaded mods.
pub fn resolve_best_effort_with(descriptors: &[ModDescriptor], options: &ResolveOptions) -> Resolution {
    let mut excluded = Vec::new();
    let mut index: BTreeMap<&str, &ModDescriptor> = BTreeMap::new();
    let loaded: BTreeSet<&str> = options.loaded.iter().map(|d| d.namespace.as_str()).collect();

    for descriptor in descriptors {
        let namespace = descriptor.namespace.as_str();
        if index.contains_key(namespace) || loaded.contains(namespace) {
            excluded.push(Exclusion {
                namespace: namespace.to_string(),
                error: ResolveError::DuplicateNamespace(namespace.to_string()),
            });
        } else {
            index.insert(namespace, descriptor);
        }
    }

    // Namespace order, so of two mods declaring each other the first is dropped.
    let candidates: Vec<&str> = index.keys().copied().collect();
    for namespace in candidates {
        let Some(descriptor) = index.get(namespace).copied() else {
            continue;
        };
        if let Some(target) = conflict_of(descriptor, &index, &options.loaded) {
            index.remove(namespace);
            excluded.push(Exclusion {
                namespace: namespace.to_string(),
                error: ResolveError::Incompatible {
                    namespace: namespace.to_string(),
                    conflicts_with: target,
                },
            });
        }
    }

    loop {
        loop {
            let missing = missing_dependencies(&index, &loaded);
            if missing.is_empty() {
                break;
            }
            for (dependent, dependency) in missing {
                index.remove(dependent);
                excluded.push(Exclusion {
                    namespace: dependent.to_string(),
                    error: ResolveError::MissingDependency {
                        dependent: dependent.to_string(),
                        dependency: dependency.to_string(),
                    },
                });
            }
        }

        let graph = DependencyGraph::build(&index, &options.preferred);
        let remaining = match graph.topological_order() {
            Ok(order) => {
                debug!(
                    "Resolved load order: {:?} ({} excluded)",
                    order,
                    excluded.len()
                );
                return Resolution {
                    order: order.into_iter().map(|ns| graph.nodes[ns].clone()).collect(),
                    excluded,
                };
            }
            Err(remaining) => remaining,
        };

        let mut cycle = graph.shortest_cycle(&remaining);
        if cycle.is_empty() {
            // Kahn only stalls on a cycle, but never loop forever on a bug.
            cycle = remaining.iter().map(|ns| ns.to_string()).collect();
        }
        debug!("Excluding dependency cycle: {:?}", cycle);
        for namespace in &cycle {
            index.remove(namespace.as_str());
            excluded.push(Exclusion {
                namespace: namespace.clone(),
                error: ResolveError::DependencyCycle {
                    cycle: cycle.clone(),
                },
            });
        }
    }
}

/// The mod `descriptor` clashes with, if any.
///
/// Covers conflicts it declares against present or loaded mods, and conflicts
/// a loaded mod declares against it.
fn conflict_of(
    descriptor: &ModDescriptor,
    index: &BTreeMap<&str, &ModDescriptor>,
    loaded: &[ModDescriptor],
) -> Option<String> {
    let namespace = descriptor.namespace.as_str();
    descriptor
        .incompatibilities()
        .find(|target| {
            *target != namespace
                && (index.contains_key(target) || loaded.iter().any(|l| l.namespace == *target))
        })
        .map(str::to_string)
        .or_else(|| {
            loaded
                .iter()
                .find(|l| l.incompatibilities().any(|target| target == namespace))
                .map(|l| l.namespace.clone())
        })
}

/// `(dependent, dependency)` for every mod whose first absent `required`
/// dependency is named, in namespace order.
fn missing_dependencies<'a>(
    index: &BTreeMap<&'a str, &'a ModDescriptor>,
    loaded: &BTreeSet<&str>,
) -> Vec<(&'a str, &'a str)> {
    index
        .iter()
        .filter_map(|(&namespace, &descriptor)| {
            descriptor
                .required_dependencies()
                .find(|dep| !index.contains_key(dep) && !loaded.contains(dep))
                .map(|dep| (namespace, dep))
        })
        .collect()
}

struct DependencyGraph<'a> {
    nodes: BTreeMap<&'a str, &'a ModDescriptor>,
    successors: BTreeMap<&'a str, BTreeSet<&'a str>>,
    rank: HashMap<&'a str, usize>,
}

impl<'a> DependencyGraph<'a> {
    fn build(index: &BTreeMap<&'a str, &'a ModDescriptor>, preferred: &[String]) -> Self {
        let mut successors: BTreeMap<&'a str, BTreeSet<&'a str>> =
            index.keys().map(|&ns| (ns, BTreeSet::new())).collect();

        for (&namespace, descriptor) in index {
            for dep in &descriptor.dependencies {
                let Some((&target, _)) = index.get_key_value(dep.namespace.as_str()) else {
                    continue;
                };
                let (from, to) = match dep.kind {
                    DependencyKind::Required | DependencyKind::Optional | DependencyKind::After => {
                        (target, namespace)
                    }
                    DependencyKind::Before => (namespace, target),
                    DependencyKind::Incompatible => continue,
                };
                successors.entry(from).or_default().insert(to);
            }
        }

        let positions: HashMap<&str, usize> = preferred
            .iter()
            .enumerate()
            .rev()
            .map(|(i, ns)| (ns.as_str(), i))
            .collect();
        let rank = index
            .keys()
            .map(|&ns| (ns, positions.get(ns).copied().unwrap_or(preferred.len())))
            .collect();

        Self {
            nodes: index.clone(),
            successors,
            rank,
        }
    }

    fn successors(&self, namespace: &str) -> impl Iterator<Item = &'a str> + '_ {
        self.successors
            .get(namespace)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Heap key of a ready mod: preference rank, then priority, then name.
    fn ready_key(&self, namespace: &'a str) -> Reverse<(usize, i32, &'a str)> {
        Reverse((
            self.rank.get(namespace).copied().unwrap_or(usize::MAX),
            self.nodes[namespace].load_priority,
            namespace,
        ))
    }

    /// Kahn's algorithm. On a stall, returns the mods that never became ready.
    fn topological_order(&self) -> Result<Vec<&'a str>, BTreeSet<&'a str>> {
        let mut in_degree: HashMap<&'a str, usize> =
            self.nodes.keys().map(|&ns| (ns, 0)).collect();
        for targets in self.successors.values() {
            for &target in targets {
                *in_degree.entry(target).or_default() += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<(usize, i32, &'a str)>> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&ns, _)| self.ready_key(ns))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse((_, _, namespace))) = ready.pop() {
            order.push(namespace);
            for next in self.successors(namespace) {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(self.ready_key(next));
                    }
                }
            }
        }

        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            Err(in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(ns, _)| ns)
                .collect())
        }
    }

    /// Shortest cycle among `remaining`, starting at its smallest namespace.
    fn shortest_cycle(&self, remaining: &BTreeSet<&'a str>) -> Vec<String> {
        let mut best: Option<Vec<&'a str>> = None;
        for &start in remaining {
            if let Some(cycle) = self.cycle_through(start, remaining) {
                if best.as_ref().map_or(true, |b| cycle.len() < b.len()) {
                    best = Some(cycle);
                }
            }
        }
        best.unwrap_or_default()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Breadth-first search for the shortest path from `start` back to itself.
    fn cycle_through(&self, start: &'a str, remaining: &BTreeSet<&'a str>) -> Option<Vec<&'a str>> {
        let mut parent: HashMap<&'a str, &'a str> = HashMap::new();
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            for next in self.successors(node) {
                if !remaining.contains(next) {
                    continue;
                }
                if next == start {
                    let mut path = vec![node];
                    let mut current = node;
                    while let Some(&prev) = parent.get(current) {
                        path.push(prev);
                        current = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                if visited.insert(next) {
                    parent.insert(next, node);
                    queue.push_back(next);
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Version;

    fn descriptor(namespace: &str) -> ModDescriptor {
        ModDescriptor::new(namespace.to_uppercase(), namespace, Version::new(1, 0, 0))
    }

    fn namespaces(order: &[ModDescriptor]) -> Vec<&str> {
        order.iter().map(|d| d.namespace.as_str()).collect()
    }

    #[test]
    fn test_unconstrained_order_uses_priority_then_namespace() {
        let mods = vec![
            descriptor("zeta"),
            descriptor("alpha").with_load_priority(10),
            descriptor("beta"),
            descriptor("gamma").with_load_priority(-1),
        ];

        let order = resolve(&mods).unwrap();
        assert_eq!(namespaces(&order), vec!["gamma", "beta", "zeta", "alpha"]);
    }

    #[test]
    fn test_dependency_kinds() {
        let mods = vec![
            descriptor("a").with_dependency("b", DependencyKind::Required),
            descriptor("b"),
            descriptor("c").with_dependency("a", DependencyKind::Before),
            descriptor("d").with_dependency("a", DependencyKind::After),
        ];

        // b -> a (required), c -> a (before), a -> d (after)
        let order = resolve(&mods).unwrap();
        assert_eq!(namespaces(&order), vec!["b", "c", "a", "d"]);
    }

    #[test]
    fn test_constraints_override_priority() {
        let mods = vec![
            descriptor("early")
                .with_load_priority(-100)
                .with_dependency("late", DependencyKind::Required),
            descriptor("late").with_load_priority(100),
        ];

        let order = resolve(&mods).unwrap();
        assert_eq!(namespaces(&order), vec!["late", "early"]);
    }

    #[test]
    fn test_absent_optional_adds_no_edge() {
        let mods = vec![
            descriptor("a").with_dependency("ghost", DependencyKind::Optional),
            descriptor("b").with_dependency("ghost", DependencyKind::After),
        ];

        let order = resolve(&mods).unwrap();
        assert_eq!(namespaces(&order), vec!["a", "b"]);
    }

    #[test]
    fn test_missing_required_dependency() {
        let mods = vec![descriptor("a").with_dependency("b", DependencyKind::Required)];

        assert_eq!(
            resolve(&mods).unwrap_err(),
            ResolveError::MissingDependency {
                dependent: "a".to_string(),
                dependency: "b".to_string(),
            }
        );
    }

    #[test]
    fn test_two_cycle() {
        let mods = vec![
            descriptor("a").with_dependency("b", DependencyKind::Required),
            descriptor("b").with_dependency("a", DependencyKind::Required),
        ];

        assert_eq!(
            resolve(&mods).unwrap_err(),
            ResolveError::DependencyCycle {
                cycle: vec!["a".to_string(), "b".to_string()],
            }
        );
    }

    #[test]
    fn test_minimal_cycle_reported() {
        // Long cycle a -> b -> c -> d -> a plus a short one c -> d -> c.
        let mods = vec![
            descriptor("a").with_dependency("d", DependencyKind::After),
            descriptor("b").with_dependency("a", DependencyKind::After),
            descriptor("c").with_dependency("b", DependencyKind::After),
            descriptor("d")
                .with_dependency("c", DependencyKind::After)
                .with_dependency("c", DependencyKind::Before),
        ];

        match resolve(&mods).unwrap_err() {
            ResolveError::DependencyCycle { cycle } => assert_eq!(cycle, vec!["c", "d"]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mods = vec![descriptor("loner").with_dependency("loner", DependencyKind::Required)];

        assert_eq!(
            resolve(&mods).unwrap_err(),
            ResolveError::DependencyCycle {
                cycle: vec!["loner".to_string()],
            }
        );
    }

    #[test]
    fn test_duplicate_namespace() {
        let mods = vec![descriptor("a"), descriptor("a")];
        assert_eq!(
            resolve(&mods).unwrap_err(),
            ResolveError::DuplicateNamespace("a".to_string())
        );
    }

    #[test]
    fn test_best_effort_cascades_missing() {
        let mods = vec![
            descriptor("a").with_dependency("ghost", DependencyKind::Required),
            descriptor("b").with_dependency("a", DependencyKind::Required),
            descriptor("c").with_dependency("a", DependencyKind::Optional),
        ];

        let resolution = resolve_best_effort(&mods);
        assert_eq!(resolution.namespaces(), vec!["c"]);
        assert_eq!(resolution.excluded.len(), 2);
        assert_eq!(
            resolution.excluded[1].error,
            ResolveError::MissingDependency {
                dependent: "b".to_string(),
                dependency: "a".to_string(),
            }
        );
    }

    #[test]
    fn test_best_effort_excludes_cycle_and_dependents() {
        let mods = vec![
            descriptor("a").with_dependency("b", DependencyKind::Required),
            descriptor("b").with_dependency("a", DependencyKind::Required),
            descriptor("c").with_dependency("a", DependencyKind::Required),
            descriptor("d").with_dependency("b", DependencyKind::After),
            descriptor("e"),
        ];

        let resolution = resolve_best_effort(&mods);
        assert_eq!(resolution.namespaces(), vec!["d", "e"]);

        let excluded: Vec<_> = resolution
            .excluded
            .iter()
            .map(|e| e.namespace.as_str())
            .collect();
        assert_eq!(excluded, vec!["a", "b", "c"]);
        assert!(matches!(
            resolution.excluded[2].error,
            ResolveError::MissingDependency { .. }
        ));
    }

    #[test]
    fn test_best_effort_keeps_first_duplicate() {
        let first = descriptor("dup").with_load_priority(1);
        let second = descriptor("dup").with_load_priority(2);

        let resolution = resolve_best_effort(&[first, second]);
        assert_eq!(resolution.order.len(), 1);
        assert_eq!(resolution.order[0].load_priority, 1);
        assert_eq!(
            resolution.excluded[0].error,
            ResolveError::DuplicateNamespace("dup".to_string())
        );
    }

    #[test]
    fn test_incompatible_excludes_declaring_mod() {
        let mods = vec![
            descriptor("dark").with_dependency("light", DependencyKind::Incompatible),
            descriptor("light"),
            descriptor("night").with_dependency("dark", DependencyKind::Required),
        ];

        let resolution = resolve_best_effort(&mods);
        assert_eq!(resolution.namespaces(), vec!["light"]);
        assert_eq!(
            resolution.excluded[0].error,
            ResolveError::Incompatible {
                namespace: "dark".to_string(),
                conflicts_with: "light".to_string(),
            }
        );
        assert!(matches!(
            resolution.excluded[1].error,
            ResolveError::MissingDependency { .. }
        ));

        assert!(matches!(
            resolve(&mods).unwrap_err(),
            ResolveError::Incompatible { .. }
        ));
    }

    #[test]
    fn test_incompatible_with_absent_mod_is_fine() {
        let mods = vec![descriptor("dark").with_dependency("light", DependencyKind::Incompatible)];
        assert_eq!(namespaces(&resolve(&mods).unwrap()), vec!["dark"]);
    }

    #[test]
    fn test_preferred_order_within_constraints() {
        let mods = vec![
            descriptor("a"),
            descriptor("b").with_dependency("a", DependencyKind::Required),
            descriptor("c"),
            descriptor("d"),
        ];
        let options = ResolveOptions::default().with_preferred(vec![
            "d".to_string(),
            "b".to_string(),
            "c".to_string(),
        ]);

        // b wants to come early but still waits for a; unlisted a goes last
        // among the ready mods, which drags b behind it.
        let resolution = resolve_best_effort_with(&mods, &options);
        assert_eq!(resolution.namespaces(), vec!["d", "c", "a", "b"]);
        assert!(resolution.excluded.is_empty());
    }

    #[test]
    fn test_loaded_mods_satisfy_dependencies() {
        let base = descriptor("base");
        let guard = descriptor("guard").with_dependency("addon", DependencyKind::Incompatible);
        let mods = vec![
            descriptor("addon").with_dependency("base", DependencyKind::Required),
            descriptor("extra").with_dependency("base", DependencyKind::Required),
            descriptor("base"),
        ];
        let options = ResolveOptions::default().with_loaded(vec![base, guard]);

        let resolution = resolve_best_effort_with(&mods, &options);
        assert_eq!(resolution.namespaces(), vec!["extra"]);

        let reasons: Vec<_> = resolution.excluded.iter().map(|e| &e.error).collect();
        assert_eq!(
            reasons,
            vec![
                &ResolveError::DuplicateNamespace("base".to_string()),
                &ResolveError::Incompatible {
                    namespace: "addon".to_string(),
                    conflicts_with: "guard".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_select_enabled_pulls_in_required() {
        let mods = vec![
            descriptor("base"),
            descriptor("addon")
                .with_dependency("base", DependencyKind::Required)
                .with_dependency("extra", DependencyKind::Optional),
            descriptor("extra"),
            descriptor("other"),
        ];

        let selection = select_enabled(&mods, &["addon".to_string(), "ghost".to_string()]);
        assert_eq!(namespaces(&selection.descriptors), vec!["base", "addon"]);
        assert_eq!(selection.unknown, vec!["ghost"]);
    }
}
