//! Strongly connected components
//!
//! Tarjan's algorithm driven by an explicit call stack, so decomposition depth is bounded by
//! heap memory rather than by the native stack. Contract input can build arbitrarily deep
//! object graphs.
//!
//! Components are emitted in reverse topological order of the condensation: when a component
//! is emitted, every component reachable from it has already been emitted.

use alloc::vec::Vec;

/// A directed graph over dense node indices `0..node_bound()`, some of which may be absent.
pub trait DirectedGraph {
    /// Exclusive upper bound on node indices
    fn node_bound(&self) -> usize;

    /// Whether `node` is present
    fn contains(&self, node: usize) -> bool;

    /// Append the successors of `node` to `out`, in a deterministic order
    fn successors(&self, node: usize, out: &mut Vec<usize>);
}

/// One strongly connected component
pub type Component = Vec<usize>;

const UNVISITED: u32 = u32::MAX;

/// Traversal state for one node on the explicit call stack
struct Frame {
    node: usize,
    /// Start of this node's successors in the shared successor buffer
    start: usize,
    /// Next successor to examine
    next: usize,
}

struct Tarjan<'a, G: DirectedGraph> {
    graph: &'a G,
    /// Discovery index per node, `UNVISITED` until first reached
    index: Vec<u32>,
    low_link: Vec<u32>,
    on_stack: Vec<bool>,
    next_index: u32,
    /// Nodes visited but not yet assigned to a component
    stack: Vec<usize>,
    call_stack: Vec<Frame>,
    /// Successor lists of every frame on the call stack, concatenated
    successors: Vec<usize>,
    components: Vec<Component>,
}

impl<'a, G: DirectedGraph> Tarjan<'a, G> {
    fn new(graph: &'a G) -> Self {
        let bound = graph.node_bound();
        Tarjan {
            graph,
            index: alloc::vec![UNVISITED; bound],
            low_link: alloc::vec![0; bound],
            on_stack: alloc::vec![false; bound],
            next_index: 0,
            stack: Vec::new(),
            call_stack: Vec::new(),
            successors: Vec::new(),
            components: Vec::new(),
        }
    }

    fn enter(&mut self, node: usize) {
        self.index[node] = self.next_index;
        self.low_link[node] = self.next_index;
        self.next_index += 1;
        self.stack.push(node);
        self.on_stack[node] = true;

        let start = self.successors.len();
        self.graph.successors(node, &mut self.successors);
        self.call_stack.push(Frame { node, start, next: start });
    }

    fn run(mut self) -> Vec<Component> {
        for root in 0..self.graph.node_bound() {
            if self.graph.contains(root) && self.index[root] == UNVISITED {
                self.visit(root);
            }
        }
        self.components
    }

    fn visit(&mut self, root: usize) {
        self.enter(root);

        while let Some(frame) = self.call_stack.last_mut() {
            let node = frame.node;

            if frame.next < self.successors.len() {
                let successor = self.successors[frame.next];
                frame.next += 1;

                if !self.graph.contains(successor) {
                    continue;
                }

                if self.index[successor] == UNVISITED {
                    self.enter(successor);
                } else if self.on_stack[successor] {
                    self.low_link[node] = self.low_link[node].min(self.index[successor]);
                }
                continue;
            }

            // Every successor examined: return from `node`
            let start = frame.start;
            self.call_stack.pop();
            self.successors.truncate(start);

            if self.low_link[node] == self.index[node] {
                self.emit(node);
            }

            if let Some(parent) = self.call_stack.last() {
                let parent = parent.node;
                self.low_link[parent] = self.low_link[parent].min(self.low_link[node]);
            }
        }
    }

    /// Pop the component rooted at `node`
    fn emit(&mut self, node: usize) {
        let mut component = Component::new();
        while let Some(member) = self.stack.pop() {
            self.on_stack[member] = false;
            component.push(member);
            if member == node {
                break;
            }
        }
        self.components.push(component);
    }
}

/// Decompose `graph` into strongly connected components.
///
/// Roots are tried in ascending node order and successors in the order the graph reports them,
/// so the output is a pure function of the graph.
pub fn strongly_connected_components<G: DirectedGraph>(graph: &G) -> Vec<Component> {
    Tarjan::new(graph).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Adjacency-list graph, `None` marks an absent node
    struct TestGraph(Vec<Option<Vec<usize>>>);

    impl DirectedGraph for TestGraph {
        fn node_bound(&self) -> usize {
            self.0.len()
        }

        fn contains(&self, node: usize) -> bool {
            matches!(self.0.get(node), Some(Some(_)))
        }

        fn successors(&self, node: usize, out: &mut Vec<usize>) {
            if let Some(Some(edges)) = self.0.get(node) {
                out.extend_from_slice(edges);
            }
        }
    }

    fn sorted(mut components: Vec<Component>) -> Vec<Component> {
        for component in &mut components {
            component.sort_unstable();
        }
        components
    }

    #[test]
    fn test_singletons() {
        let graph = TestGraph(alloc::vec![Some(alloc::vec![]), Some(alloc::vec![])]);
        assert_eq!(sorted(strongly_connected_components(&graph)), [[0], [1]]);
    }

    #[test]
    fn test_cycle_collapses() {
        // 0 -> 1 -> 2 -> 0, 2 -> 3
        let graph = TestGraph(alloc::vec![
            Some(alloc::vec![1]),
            Some(alloc::vec![2]),
            Some(alloc::vec![0, 3]),
            Some(alloc::vec![]),
        ]);
        let components = sorted(strongly_connected_components(&graph));
        assert_eq!(components, [alloc::vec![3], alloc::vec![0, 1, 2]]);
    }

    #[test]
    fn test_reachable_components_emitted_first() {
        // 0 -> 1 -> 2, 3 -> 1
        let graph = TestGraph(alloc::vec![
            Some(alloc::vec![1]),
            Some(alloc::vec![2]),
            Some(alloc::vec![]),
            Some(alloc::vec![1]),
        ]);
        let components = strongly_connected_components(&graph);
        let position = |node: usize| components.iter().position(|c| c.contains(&node)).unwrap();

        assert!(position(2) < position(1));
        assert!(position(1) < position(0));
        assert!(position(1) < position(3));
    }

    #[test]
    fn test_absent_nodes_skipped() {
        let graph = TestGraph(alloc::vec![Some(alloc::vec![1, 2]), None, Some(alloc::vec![0])]);
        assert_eq!(sorted(strongly_connected_components(&graph)), [[0, 2]]);
    }

    #[test]
    fn test_self_loop() {
        let graph = TestGraph(alloc::vec![Some(alloc::vec![0])]);
        assert_eq!(strongly_connected_components(&graph), [[0]]);
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        const DEPTH: usize = 200_000;
        let nodes = (0..DEPTH)
            .map(|node| Some(if node + 1 < DEPTH { alloc::vec![node + 1] } else { alloc::vec![] }))
            .collect();
        let components = strongly_connected_components(&TestGraph(nodes));

        assert_eq!(components.len(), DEPTH);
        assert_eq!(components[0], [DEPTH - 1]);
    }

    #[test]
    fn test_deep_ring_is_one_component() {
        const DEPTH: usize = 100_000;
        let nodes = (0..DEPTH).map(|node| Some(alloc::vec![(node + 1) % DEPTH])).collect();
        let components = strongly_connected_components(&TestGraph(nodes));

        assert_eq!(components.len(), 1);
        assert_eq!(components[0].len(), DEPTH);
    }
}
