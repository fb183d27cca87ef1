//! `${NAME}` reference graph
//!
//! Nodes are variables stored densely by declaration index; an edge `a -> b`
//! means `a` references `b` and must be resolved after it. Cycle detection is
//! an iterative depth-first search and ordering uses Kahn's algorithm, so
//! neither recurses on deep chains.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::errors::{ErrorCode, ValidationError};
use crate::variable::VariableDefinition;

static REFERENCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("reference pattern is valid")
});

/// Names referenced as `${NAME}`, deduplicated, in order of first use
#[must_use]
pub fn extract_references(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for capture in REFERENCE_PATTERN.captures_iter(text) {
        let name = &capture[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Replaces every `${NAME}` with `lookup(NAME)`; unknown names are left as is
pub fn interpolate<'a>(text: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    REFERENCE_PATTERN
        .replace_all(text, |caps: &regex::Captures<'_>| {
            lookup(&caps[1]).map_or_else(|| caps[0].to_string(), str::to_string)
        })
        .into_owned()
}

/// A `${NAME}` that names no declared variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingReference {
    /// Referencing variable
    pub from: String,
    /// Undeclared name
    pub name: String,
}

impl MissingReference {
    /// Report attributed to the referencing variable
    #[must_use]
    pub fn to_error(&self) -> ValidationError {
        ValidationError::new(
            ErrorCode::VarReferenceNotFound,
            format!("'{}' references undefined variable '{}'", self.from, self.name),
        )
        .with_actual(format!("${{{}}}", self.name))
        .with_suggestion(format!("declare '{}' or remove the reference", self.name))
    }
}

/// Edge removed to break a cycle whose members all have usable defaults
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokenEdge {
    /// Referencing variable
    pub from: String,
    /// Referenced variable; its default stands in for its value
    pub to: String,
}

/// Outcome of ordering the graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphAnalysis {
    /// Orderable variables grouped so each layer depends only on earlier ones
    pub layers: Vec<Vec<String>>,
    /// Layers flattened
    pub order: Vec<String>,
    /// Cycles left in place, each as a closed path `[A, B, A]`
    pub cycles: Vec<Vec<String>>,
    /// Cycles that were broken
    pub broken_cycles: Vec<Vec<String>>,
    /// Edges removed to break cycles
    pub broken_edges: Vec<BrokenEdge>,
    /// References to undeclared names
    pub missing: Vec<MissingReference>,
    /// Variables that cannot be ordered: on or behind a remaining cycle
    pub blocked: Vec<String>,
}

/// Resolution order for an acyclic graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionOrder {
    /// Variables grouped into dependency layers
    pub layers: Vec<Vec<String>>,
    /// Layers flattened
    pub order: Vec<String>,
    /// Edges removed to break cycles
    pub broken_edges: Vec<BrokenEdge>,
    /// References to undeclared names
    pub missing: Vec<MissingReference>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Reference graph over a set of variables
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    /// Dependencies of each node, in reference order
    edges: Vec<Vec<usize>>,
    usable_default: Vec<bool>,
    missing: Vec<MissingReference>,
}

impl DependencyGraph {
    /// Builds the graph; a repeated name keeps its first declaration
    #[must_use]
    pub fn build(variables: &[VariableDefinition]) -> Self {
        let mut graph = Self::default();
        let mut kept = Vec::with_capacity(variables.len());
        for variable in variables {
            if graph.index.contains_key(&variable.name) {
                continue;
            }
            graph.index.insert(variable.name.clone(), graph.names.len());
            graph.names.push(variable.name.clone());
            graph.usable_default.push(variable.usable_default().is_some());
            kept.push(variable);
        }
        for variable in kept {
            let mut deps = Vec::new();
            for dependency in &variable.dependencies {
                match graph.index.get(dependency) {
                    Some(&target) => deps.push(target),
                    None => graph.missing.push(MissingReference {
                        from: variable.name.clone(),
                        name: dependency.clone(),
                    }),
                }
            }
            graph.edges.push(deps);
        }
        graph
    }

    /// Number of variables
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if the graph has no variables
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Declared dependencies of `name`
    #[must_use]
    pub fn dependencies(&self, name: &str) -> Option<Vec<&str>> {
        let &node = self.index.get(name)?;
        Some(self.edges[node].iter().map(|&d| self.names[d].as_str()).collect())
    }

    /// Every cycle reachable by a depth-first search, one per back edge
    ///
    /// Nodes are started in declaration order and neighbours visited in
    /// reference order, so the result is deterministic.
    #[must_use]
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        self.cycle_paths()
            .into_iter()
            .map(|path| self.path_names(&path))
            .collect()
    }

    fn cycle_paths(&self) -> Vec<Vec<usize>> {
        let mut color = vec![Color::White; self.len()];
        let mut cycles = Vec::new();

        for start in 0..self.len() {
            if color[start] != Color::White {
                continue;
            }
            // (node, index of the next neighbour to visit)
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            color[start] = Color::Gray;

            while let Some(top) = stack.last_mut() {
                let (node, next) = *top;
                let Some(&target) = self.edges[node].get(next) else {
                    color[node] = Color::Black;
                    stack.pop();
                    continue;
                };
                top.1 += 1;
                match color[target] {
                    Color::White => {
                        color[target] = Color::Gray;
                        stack.push((target, 0));
                    }
                    Color::Gray => {
                        let from = stack.iter().position(|&(n, _)| n == target).unwrap_or(0);
                        let mut path: Vec<usize> = stack[from..].iter().map(|&(n, _)| n).collect();
                        path.push(target);
                        cycles.push(path);
                    }
                    Color::Black => {}
                }
            }
        }
        cycles
    }

    fn path_names(&self, path: &[usize]) -> Vec<String> {
        path.iter().map(|&n| self.names[n].clone()).collect()
    }

    /// Orders the graph into layers
    ///
    /// With `allow_circular`, a cycle whose members all have a default free of
    /// references is broken by dropping its closing edge. Other cycles stay
    /// and their members, plus everything that depends on them, are blocked.
    #[must_use]
    pub fn analyze(&self, allow_circular: bool) -> GraphAnalysis {
        let mut analysis = GraphAnalysis {
            missing: self.missing.clone(),
            ..GraphAnalysis::default()
        };
        let mut removed: Vec<(usize, usize)> = Vec::new();

        for path in self.cycle_paths() {
            let breakable = allow_circular && path.iter().all(|&n| self.usable_default[n]);
            let names = self.path_names(&path);
            if breakable {
                let (from, to) = (path[path.len() - 2], path[path.len() - 1]);
                debug!(cycle = %names.join(" -> "), "breaking cycle");
                removed.push((from, to));
                analysis.broken_edges.push(BrokenEdge {
                    from: self.names[from].clone(),
                    to: self.names[to].clone(),
                });
                analysis.broken_cycles.push(names);
            } else {
                warn!(cycle = %names.join(" -> "), "circular dependency");
                analysis.cycles.push(names);
            }
        }

        // Kahn's algorithm over the remaining edges
        let mut pending = vec![0usize; self.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.len()];
        for (node, deps) in self.edges.iter().enumerate() {
            for &dep in deps {
                if removed.contains(&(node, dep)) {
                    continue;
                }
                pending[node] += 1;
                dependents[dep].push(node);
            }
        }

        let mut layer: Vec<usize> = (0..self.len()).filter(|&n| pending[n] == 0).collect();
        let mut placed = vec![false; self.len()];
        while !layer.is_empty() {
            let mut next = Vec::new();
            for &node in &layer {
                placed[node] = true;
                for &dependent in &dependents[node] {
                    pending[dependent] -= 1;
                    if pending[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            next.sort_unstable();
            next.dedup();
            let names: Vec<String> = layer.iter().map(|&n| self.names[n].clone()).collect();
            analysis.order.extend(names.iter().cloned());
            analysis.layers.push(names);
            layer = next;
        }

        analysis.blocked = (0..self.len())
            .filter(|&n| !placed[n])
            .map(|n| self.names[n].clone())
            .collect();
        analysis
    }
}

/// Error reporting every remaining cycle
fn circular_error(cycles: &[Vec<String>]) -> ValidationError {
    let paths: Vec<String> = cycles.iter().map(|c| c.join(" -> ")).collect();
    ValidationError::new(
        ErrorCode::VarCircularDependency,
        format!("circular dependency detected: {}", paths.join("; ")),
    )
    .with_actual(paths.join("; "))
    .with_suggestion("remove one of the references, or give every variable in the cycle a default and allow circular references")
}

impl GraphAnalysis {
    /// Error describing the remaining cycles, if any
    #[must_use]
    pub fn cycle_error(&self) -> Option<ValidationError> {
        (!self.cycles.is_empty()).then(|| circular_error(&self.cycles))
    }
}

/// Orders `variables` for resolution
///
/// # Errors
///
/// Returns a single `VAR_CIRCULAR_DEPENDENCY` error listing every cycle that
/// could not be broken.
pub fn resolve(
    variables: &[VariableDefinition],
    allow_circular: bool,
) -> Result<ResolutionOrder, ValidationError> {
    let analysis = DependencyGraph::build(variables).analyze(allow_circular);
    if let Some(error) = analysis.cycle_error() {
        return Err(error);
    }
    Ok(ResolutionOrder {
        layers: analysis.layers,
        order: analysis.order,
        broken_edges: analysis.broken_edges,
        missing: analysis.missing,
    })
}
