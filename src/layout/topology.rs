//! Topological analysis of pipeline layouts.
//!
//! Provides:
//! - A stable topological order (Kahn's algorithm, lowest index first)
//! - Dependency queries between elements

use crate::core::error::{LayoutError, LayoutResult};
use crate::layout::connection::ElementRef;
use crate::layout::pipeline::PipelineLayout;
use std::collections::{BTreeSet, HashSet};

/// Order `count` nodes so every edge `(from, to)` has `from` first.
///
/// Among the nodes ready at any point, the one with the smallest index is
/// taken, so the result only depends on declaration order. Duplicate edges
/// are allowed. On a cycle, the nodes that could not be ordered are returned
/// as the error.
pub fn stable_topological_order(
    count: usize,
    edges: &[(usize, usize)],
) -> Result<Vec<usize>, Vec<usize>> {
    let mut in_degree = vec![0usize; count];
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); count];

    for &(from, to) in edges {
        adjacency[from].push(to);
        in_degree[to] += 1;
    }

    let mut ready: BTreeSet<usize> = (0..count).filter(|&n| in_degree[n] == 0).collect();
    let mut result = Vec::with_capacity(count);

    while let Some(node) = ready.pop_first() {
        result.push(node);

        for &neighbor in &adjacency[node] {
            in_degree[neighbor] -= 1;
            if in_degree[neighbor] == 0 {
                ready.insert(neighbor);
            }
        }
    }

    if result.len() != count {
        let remaining = (0..count).filter(|&n| in_degree[n] > 0).collect();
        return Err(remaining);
    }

    Ok(result)
}

/// Analyzer for the element graph of one layout level.
pub struct TopologyAnalyzer<'a> {
    layout: &'a PipelineLayout,
}

impl<'a> TopologyAnalyzer<'a> {
    /// Create a new analyzer for the given layout.
    pub fn new(layout: &'a PipelineLayout) -> Self {
        Self { layout }
    }

    fn edges(&self) -> Vec<(usize, usize)> {
        self.layout
            .connections()
            .iter()
            .filter_map(|c| match (&c.from.element, &c.to.element) {
                (ElementRef::Element(from), ElementRef::Element(to)) => Some((
                    self.layout.element_index(from)?,
                    self.layout.element_index(to)?,
                )),
                _ => None,
            })
            .collect()
    }

    /// Element names with producers before consumers, ties broken by
    /// declaration order.
    pub fn topological_sort(&self) -> LayoutResult<Vec<String>> {
        let names: Vec<&str> = self.layout.elements().map(|(name, _)| name).collect();
        stable_topological_order(names.len(), &self.edges())
            .map(|order| order.into_iter().map(|i| names[i].to_string()).collect())
            .map_err(|remaining| LayoutError::Cycle {
                elements: remaining.into_iter().map(|i| names[i].to_string()).collect(),
            })
    }

    /// Check if the element graph has any cycles.
    pub fn has_cycle(&self) -> bool {
        self.topological_sort().is_err()
    }

    /// Elements feeding `name` directly.
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.layout
            .connections_to(name)
            .filter_map(|c| match &c.from.element {
                ElementRef::Element(from) => Some(from.clone()),
                ElementRef::Boundary => None,
            })
            .filter(|from| seen.insert(from.clone()))
            .collect()
    }

    /// Elements fed directly by `name`.
    pub fn dependents(&self, name: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.layout
            .connections_from(name)
            .filter_map(|c| match &c.to.element {
                ElementRef::Element(to) => Some(to.clone()),
                ElementRef::Boundary => None,
            })
            .filter(|to| seen.insert(to.clone()))
            .collect()
    }

    /// Elements with no path to any boundary output.
    pub fn dead_elements(&self) -> Vec<String> {
        let mut live: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = self
            .layout
            .connections()
            .iter()
            .filter(|c| c.to.element.is_boundary())
            .map(|c| c.from.element.name().to_string())
            .collect();

        while let Some(current) = stack.pop() {
            if live.insert(current.clone()) {
                stack.extend(self.dependencies(&current));
            }
        }

        self.layout
            .elements()
            .map(|(name, _)| name)
            .filter(|name| !live.contains(*name))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::TextureFormat;
    use crate::core::shader::ShaderSource;
    use crate::layout::filter::FilterLayout;
    use proptest::prelude::*;

    const MIX: &str = "uniform sampler2D a, b;\nout vec4 result;\nvoid main() { result = vec4(0.0); }\n";

    fn mix() -> FilterLayout {
        FilterLayout::new("Mix", TextureFormat::rgba8(2, 2), ShaderSource::new(MIX).unwrap()).unwrap()
    }

    #[test]
    fn test_stable_order() {
        // 0 -> 2, 1 -> 2, 3 has no edges
        let order = stable_topological_order(4, &[(1, 2), (0, 2)]).unwrap();
        assert_eq!(order, vec![0, 1, 2, 3]);

        let order = stable_topological_order(3, &[(2, 0), (2, 1)]).unwrap();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn test_cycle_remaining() {
        let remaining = stable_topological_order(3, &[(0, 1), (1, 2), (2, 1)]).unwrap_err();
        assert_eq!(remaining, vec![1, 2]);
    }

    #[test]
    fn test_layout_sort_and_dependencies() {
        let mut layout = PipelineLayout::new("Diamond");
        layout.add_input("In").unwrap();
        layout.add_output("Out").unwrap();
        for name in ["D", "B", "C", "A", "Unused"] {
            layout.add(mix(), name).unwrap();
        }
        layout.connect_to_input("In", "A", "a").unwrap();
        layout.connect_to_input("In", "A", "b").unwrap();
        layout.connect("A", "result", "B", "a").unwrap();
        layout.connect("A", "result", "B", "b").unwrap();
        layout.connect("A", "result", "C", "a").unwrap();
        layout.connect("B", "result", "C", "b").unwrap();
        layout.connect("B", "result", "D", "a").unwrap();
        layout.connect("C", "result", "D", "b").unwrap();
        layout.connect_to_output("D", "result", "Out").unwrap();

        let analyzer = TopologyAnalyzer::new(&layout);
        assert_eq!(analyzer.topological_sort().unwrap(), vec!["A", "B", "C", "D", "Unused"]);
        assert!(!analyzer.has_cycle());
        assert_eq!(analyzer.dependencies("B"), vec!["A"]);
        assert_eq!(analyzer.dependents("A"), vec!["B", "C"]);
        assert_eq!(analyzer.dead_elements(), vec!["Unused"]);
    }

    proptest! {
        #[test]
        fn prop_order_respects_edges(
            count in 1usize..12,
            raw in proptest::collection::vec((0usize..12, 0usize..12), 0..30),
        ) {
            // Forward edges only, so the graph is acyclic.
            let edges: Vec<(usize, usize)> = raw
                .into_iter()
                .map(|(a, b)| (a % count, b % count))
                .filter(|(a, b)| a < b)
                .collect();
            let order = stable_topological_order(count, &edges).unwrap();
            prop_assert_eq!(order.len(), count);
            let position: Vec<usize> = {
                let mut p = vec![0; count];
                for (i, &n) in order.iter().enumerate() {
                    p[n] = i;
                }
                p
            };
            for &(a, b) in &edges {
                prop_assert!(position[a] < position[b]);
            }
            let mut shuffled = edges.clone();
            shuffled.reverse();
            prop_assert_eq!(order, stable_topological_order(count, &shuffled).unwrap());
        }
    }
}
