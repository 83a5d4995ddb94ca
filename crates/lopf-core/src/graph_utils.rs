//! Topology helpers over the passive branch graph.
//!
//! Buses are nodes and lines/transformers are edges oriented `bus0 -> bus1`.
//! Links are controllable and never part of this graph.

use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, VecDeque};
use tracing::warn;

use crate::components::{ComponentType, PassiveBranch};
use crate::Network;

/// A line or transformer as seen by the network equations.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchRef {
    pub component: ComponentType,
    pub name: String,
    pub bus0: String,
    pub bus1: String,
    /// Series reactance in per unit. Line ohms are divided by `v_nom²` of
    /// `bus0`, transformer values (per unit on their own rating) by `s_nom`.
    pub x_pu: f64,
    /// Series resistance in per unit
    pub r_pu: f64,
}

/// One branch of a cycle; `direction` is +1 when the cycle runs `bus0 -> bus1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleEdge {
    /// Position in [`TopologyGraph::branches`]
    pub branch: usize,
    pub direction: f64,
}

pub type Cycle = Vec<CycleEdge>;

/// Undirected multigraph of buses connected by passive branches.
#[derive(Debug)]
pub struct TopologyGraph {
    pub graph: UnGraph<String, usize>,
    pub branches: Vec<BranchRef>,
}

/// Bus membership of one connected sub-network.
#[derive(Debug)]
pub struct SubNetwork {
    pub id: usize,
    pub buses: Vec<String>,
}

/// All passive branches of the network, lines first, with per-unit impedances.
pub fn passive_branches(network: &Network) -> Vec<BranchRef> {
    let v_nom: HashMap<&str, f64> = network
        .buses
        .iter()
        .map(|b| (b.name.as_str(), b.v_nom))
        .collect();
    let to_ref = |c: ComponentType, b: &PassiveBranch, base: f64| BranchRef {
        component: c,
        name: b.name.clone(),
        bus0: b.bus0.clone(),
        bus1: b.bus1.clone(),
        x_pu: b.x / base,
        r_pu: b.r / base,
    };
    let lines = network.lines.iter().map(|l| {
        let v = v_nom.get(l.bus0.as_str()).copied().unwrap_or(1.0);
        to_ref(ComponentType::Line, l, v * v)
    });
    let transformers = network.transformers.iter().map(|t| {
        let s_nom = t.0.s_nom;
        let base = if s_nom.is_finite() && s_nom > 0.0 { s_nom } else { 1.0 };
        to_ref(ComponentType::Transformer, &t.0, base)
    });
    lines.chain(transformers).collect()
}

impl TopologyGraph {
    /// Build the graph from the branches accepted by `include`.
    pub fn build(network: &Network, include: impl Fn(&BranchRef) -> bool) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut nodes = HashMap::new();
        for bus in &network.buses {
            nodes.insert(bus.name.clone(), graph.add_node(bus.name.clone()));
        }
        let mut branches = Vec::new();
        for branch in passive_branches(network).into_iter().filter(|b| include(b)) {
            let (Some(&n0), Some(&n1)) = (nodes.get(&branch.bus0), nodes.get(&branch.bus1))
            else {
                warn!(
                    branch = %branch.name,
                    "skipping {} with unknown terminal bus", branch.component
                );
                continue;
            };
            graph.add_edge(n0, n1, branches.len());
            branches.push(branch);
        }
        Self { graph, branches }
    }

    /// Independent cycles of the graph.
    ///
    /// A BFS spanning forest is built first; every non-tree edge (parallel
    /// branches included) closes exactly one cycle with the tree path between
    /// its terminals.
    pub fn cycle_basis(&self) -> Vec<Cycle> {
        let graph = &self.graph;
        let n = graph.node_count();
        let mut parent: Vec<Option<(NodeIndex, EdgeIndex)>> = vec![None; n];
        let mut depth = vec![usize::MAX; n];
        let mut in_tree = vec![false; graph.edge_count()];

        for root in graph.node_indices() {
            if depth[root.index()] != usize::MAX {
                continue;
            }
            depth[root.index()] = 0;
            let mut queue = VecDeque::from([root]);
            while let Some(u) = queue.pop_front() {
                for edge in graph.edges(u) {
                    let v = if edge.source() == u {
                        edge.target()
                    } else {
                        edge.source()
                    };
                    if depth[v.index()] == usize::MAX {
                        depth[v.index()] = depth[u.index()] + 1;
                        parent[v.index()] = Some((u, edge.id()));
                        in_tree[edge.id().index()] = true;
                        queue.push_back(v);
                    }
                }
            }
        }

        // +1 when stepping from `from` along `edge` follows bus0 -> bus1
        let orientation = |edge: EdgeIndex, from: NodeIndex| -> f64 {
            match graph.edge_endpoints(edge) {
                Some((source, _)) if source == from => 1.0,
                _ => -1.0,
            }
        };

        let mut cycles = Vec::new();
        for edge in graph.edge_references() {
            if in_tree[edge.id().index()] {
                continue;
            }
            let (a, b) = (edge.source(), edge.target());
            let mut cycle = vec![CycleEdge {
                branch: *edge.weight(),
                direction: 1.0,
            }];

            // climb from both terminals to their common ancestor
            let mut from_b = Vec::new();
            let mut from_a = Vec::new();
            let (mut x, mut y) = (b, a);
            let step = |node: NodeIndex, path: &mut Vec<(NodeIndex, EdgeIndex)>| {
                parent[node.index()].map(|(p, e)| {
                    path.push((node, e));
                    p
                })
            };
            while depth[x.index()] > depth[y.index()] {
                match step(x, &mut from_b) {
                    Some(p) => x = p,
                    None => break,
                }
            }
            while depth[y.index()] > depth[x.index()] {
                match step(y, &mut from_a) {
                    Some(p) => y = p,
                    None => break,
                }
            }
            while x != y {
                match (step(x, &mut from_b), step(y, &mut from_a)) {
                    (Some(px), Some(py)) => {
                        x = px;
                        y = py;
                    }
                    _ => break,
                }
            }

            // b up to the ancestor, then down to a
            for &(node, e) in &from_b {
                cycle.push(CycleEdge {
                    branch: graph[e],
                    direction: orientation(e, node),
                });
            }
            for &(node, e) in from_a.iter().rev() {
                cycle.push(CycleEdge {
                    branch: graph[e],
                    direction: -orientation(e, node),
                });
            }
            cycles.push(cycle);
        }
        cycles
    }

    /// Connected components of the bus graph, in bus order.
    pub fn sub_networks(&self) -> Vec<SubNetwork> {
        let graph = &self.graph;
        let mut visited = vec![false; graph.node_count()];
        let mut result = Vec::new();
        for start in graph.node_indices() {
            if visited[start.index()] {
                continue;
            }
            let mut queue = VecDeque::from([start]);
            let mut members = Vec::new();
            while let Some(node) = queue.pop_front() {
                if std::mem::replace(&mut visited[node.index()], true) {
                    continue;
                }
                members.push(graph[node].clone());
                for neighbor in graph.neighbors(node) {
                    if !visited[neighbor.index()] {
                        queue.push_back(neighbor);
                    }
                }
            }
            result.push(SubNetwork {
                id: result.len(),
                buses: members,
            });
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Bus, Transformer};

    fn cycle_sum(topo: &TopologyGraph, cycle: &Cycle, flows: &[f64]) -> f64 {
        cycle
            .iter()
            .map(|e| e.direction * topo.branches[e.branch].x_pu * flows[e.branch])
            .sum()
    }

    fn triangle() -> Network {
        let mut n = Network::new();
        for b in ["a", "b", "c"] {
            n.buses.push(Bus::new(b));
        }
        n.lines.push(PassiveBranch::new("ab", "a", "b", 1.0, 10.0));
        n.lines.push(PassiveBranch::new("bc", "b", "c", 1.0, 10.0));
        n.lines.push(PassiveBranch::new("ca", "c", "a", 1.0, 10.0));
        n
    }

    #[test]
    fn triangle_has_one_oriented_cycle() {
        let topo = TopologyGraph::build(&triangle(), |_| true);
        let cycles = topo.cycle_basis();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 3);
        // circulating flow a->b->c->a satisfies the loop with equal signs
        let dirs: Vec<f64> = cycles[0].iter().map(|e| e.direction).collect();
        assert!(dirs.iter().all(|d| *d == dirs[0]));
    }

    #[test]
    fn cycle_orientation_handles_reversed_branches() {
        let mut n = triangle();
        n.lines[2] = PassiveBranch::new("ca", "a", "c", 2.0, 10.0);
        let topo = TopologyGraph::build(&n, |_| true);
        let cycles = topo.cycle_basis();
        assert_eq!(cycles.len(), 1);
        // angles θa=0, θb=-1, θc=-3 give flows (θ0-θ1)/x
        let flows = [1.0, 2.0, 1.5];
        assert!(cycle_sum(&topo, &cycles[0], &flows).abs() < 1e-12);
    }

    #[test]
    fn parallel_branches_form_a_cycle() {
        let mut n = Network::new();
        n.buses.push(Bus::new("a"));
        n.buses.push(Bus::new("b"));
        n.lines.push(PassiveBranch::new("l1", "a", "b", 1.0, 10.0));
        n.transformers
            .push(Transformer(PassiveBranch::new("t1", "b", "a", 0.5, 10.0)));
        let topo = TopologyGraph::build(&n, |_| true);
        let cycles = topo.cycle_basis();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0][0].direction, cycles[0][1].direction);
    }

    #[test]
    fn tree_and_filtered_graphs_have_no_cycles() {
        let topo = TopologyGraph::build(&triangle(), |b| b.name != "ca");
        assert!(topo.cycle_basis().is_empty());
        assert_eq!(topo.branches.len(), 2);
        assert_eq!(topo.sub_networks().len(), 1);
    }

    #[test]
    fn line_reactance_is_scaled_by_voltage() {
        let mut n = triangle();
        n.buses[0].v_nom = 10.0;
        let branches = passive_branches(&n);
        assert!((branches[0].x_pu - 0.01).abs() < 1e-12);
        assert_eq!(branches[1].x_pu, 1.0);
    }

    #[test]
    fn transformer_impedance_is_scaled_by_rating() {
        let mut n = triangle();
        n.transformers.push(Transformer(
            PassiveBranch::new("t1", "a", "b", 0.1, 100.0).with_resistance(0.01),
        ));
        n.transformers
            .push(Transformer(PassiveBranch::new("t2", "b", "c", 0.1, 0.0)));
        let branches = passive_branches(&n);
        assert_eq!(branches[3].component, ComponentType::Transformer);
        assert!((branches[3].x_pu - 0.001).abs() < 1e-12);
        assert!((branches[3].r_pu - 0.0001).abs() < 1e-12);
        // unrated transformers keep their values
        assert_eq!(branches[4].x_pu, 0.1);
    }

    #[test]
    fn islands_are_reported_separately() {
        let mut n = triangle();
        n.buses.push(Bus::new("island"));
        let topo = TopologyGraph::build(&n, |_| true);
        let subs = topo.sub_networks();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[1].buses, vec!["island".to_string()]);
    }
}
