//! Graph-genome variation operators and the per-run innovation context.

use std::collections::HashMap;

use crate::engine::rng::EvoRng;
use crate::schema::{CompatibilityConfig, ConnectionGene, Genome, NeatConfig, NodeGene, NodeKind};

/// Run-scoped innovation bookkeeping. The same structural mutation occurring
/// twice in one run receives the same innovation id, so crossover and
/// compatibility distance can align genes across lineages.
#[derive(Debug, Clone, Default)]
pub struct InnovationContext {
    next_innovation: u32,
    next_node_id: u32,
    /// (from, to) -> innovation id of that connection.
    connections: HashMap<(u32, u32), u32>,
    /// Innovation id of a split connection -> (new node id, in-connection
    /// innovation, out-connection innovation).
    splits: HashMap<u32, (u32, u32, u32)>,
}

impl InnovationContext {
    pub fn new(next_innovation: u32, next_node_id: u32) -> Self {
        Self {
            next_innovation,
            next_node_id,
            connections: HashMap::new(),
            splits: HashMap::new(),
        }
    }

    pub fn next_innovation(&self) -> u32 {
        self.next_innovation
    }

    pub fn next_node_id(&self) -> u32 {
        self.next_node_id
    }

    /// Innovation id for a connection from `from` to `to`, minted on first
    /// use and reused afterwards.
    pub fn connection_id(&mut self, from: u32, to: u32) -> u32 {
        if let Some(&id) = self.connections.get(&(from, to)) {
            return id;
        }
        let id = self.next_innovation;
        self.next_innovation += 1;
        self.connections.insert((from, to), id);
        id
    }

    /// Node id and connection innovations for splitting the connection with
    /// `innovation`, reused when the same connection is split again elsewhere
    /// in the population.
    pub fn split_ids(&mut self, innovation: u32, from: u32, to: u32) -> (u32, u32, u32) {
        if let Some(&ids) = self.splits.get(&innovation) {
            return ids;
        }
        let node = self.next_node_id;
        self.next_node_id += 1;
        let in_conn = self.connection_id(from, node);
        let out_conn = self.connection_id(node, to);
        self.splits.insert(innovation, (node, in_conn, out_conn));
        (node, in_conn, out_conn)
    }

    /// Ensure node ids below `count` are never minted for hidden nodes.
    /// Called when the fixed input/output nodes are laid out.
    pub fn reserve_nodes(&mut self, count: u32) {
        self.next_node_id = self.next_node_id.max(count);
    }
}

/// Minimal starting genome: every input connected to every output.
pub fn minimal_genome(
    inputs: usize,
    outputs: usize,
    ctx: &mut InnovationContext,
    rng: &mut EvoRng,
) -> Genome {
    ctx.reserve_nodes((inputs + outputs) as u32);
    let mut nodes = Vec::with_capacity(inputs + outputs);
    for i in 0..inputs {
        nodes.push(NodeGene {
            id: i as u32,
            kind: NodeKind::Input,
            bias: 0.0,
        });
    }
    for o in 0..outputs {
        nodes.push(NodeGene {
            id: (inputs + o) as u32,
            kind: NodeKind::Output,
            bias: rng.uniform(-1.0, 1.0),
        });
    }

    let mut connections = Vec::with_capacity(inputs * outputs);
    for i in 0..inputs {
        for o in 0..outputs {
            let (from, to) = (i as u32, (inputs + o) as u32);
            connections.push(ConnectionGene {
                innovation: ctx.connection_id(from, to),
                from,
                to,
                weight: rng.uniform(-1.0, 1.0),
                enabled: true,
            });
        }
    }

    Genome::Graph {
        inputs,
        outputs,
        nodes,
        connections,
    }
}

fn graph_parts(genome: &Genome) -> (&[NodeGene], &[ConnectionGene]) {
    match genome {
        Genome::Graph {
            nodes, connections, ..
        } => (nodes, connections),
        Genome::Dense { .. } => (&[], &[]),
    }
}

fn graph_parts_mut(genome: &mut Genome) -> (&mut Vec<NodeGene>, &mut Vec<ConnectionGene>) {
    match genome {
        Genome::Graph {
            nodes, connections, ..
        } => (nodes, connections),
        Genome::Dense { .. } => unreachable!("NEAT only operates on graph genomes"),
    }
}

/// Would adding from -> to create a cycle among enabled connections?
fn creates_cycle(connections: &[ConnectionGene], from: u32, to: u32) -> bool {
    if from == to {
        return true;
    }
    // DFS from `to`: a path back to `from` means the new edge closes a loop.
    let mut stack = vec![to];
    let mut visited = Vec::new();
    while let Some(node) = stack.pop() {
        if node == from {
            return true;
        }
        if visited.contains(&node) {
            continue;
        }
        visited.push(node);
        for conn in connections.iter().filter(|c| c.enabled && c.from == node) {
            stack.push(conn.to);
        }
    }
    false
}

/// Apply weight and structural mutations in place.
pub fn mutate(
    genome: &mut Genome,
    config: &NeatConfig,
    ctx: &mut InnovationContext,
    rng: &mut EvoRng,
) {
    if rng.chance(config.weight_mutation_rate) {
        let (nodes, connections) = graph_parts_mut(genome);
        for conn in connections.iter_mut() {
            if rng.chance(config.weight_replace_rate) {
                conn.weight = rng.uniform(-2.0, 2.0);
            } else {
                conn.weight += rng.gaussian(config.weight_mutation_strength);
            }
        }
        for node in nodes.iter_mut().filter(|n| n.kind != NodeKind::Input) {
            node.bias += rng.gaussian(config.weight_mutation_strength * 0.5);
        }
    }

    if rng.chance(config.conn_add_rate) {
        add_connection(genome, ctx, rng);
    }
    if rng.chance(config.node_add_rate) {
        add_node(genome, ctx, rng);
    }
    if rng.chance(config.conn_enable_rate) {
        toggle_connection(genome, true, rng);
    }
    if rng.chance(config.conn_disable_rate) {
        toggle_connection(genome, false, rng);
    }
}

/// Add one new feed-forward connection between previously unconnected nodes.
/// Gives up quietly after a bounded number of draws on dense graphs.
pub fn add_connection(genome: &mut Genome, ctx: &mut InnovationContext, rng: &mut EvoRng) {
    let weight = rng.uniform(-1.0, 1.0);
    let (nodes, connections) = graph_parts_mut(genome);
    for _ in 0..20 {
        let from = nodes[rng.index(nodes.len())];
        let to = nodes[rng.index(nodes.len())];
        if to.kind == NodeKind::Input || from.kind == NodeKind::Output {
            continue;
        }
        if connections
            .iter()
            .any(|c| c.from == from.id && c.to == to.id)
        {
            continue;
        }
        if creates_cycle(connections, from.id, to.id) {
            continue;
        }
        connections.push(ConnectionGene {
            innovation: ctx.connection_id(from.id, to.id),
            from: from.id,
            to: to.id,
            weight,
            enabled: true,
        });
        return;
    }
}

/// Split a random enabled connection: disable it, insert a hidden node, and
/// bridge it with weight 1.0 into the node and the old weight out of it.
pub fn add_node(genome: &mut Genome, ctx: &mut InnovationContext, rng: &mut EvoRng) {
    let (nodes, connections) = graph_parts_mut(genome);
    let enabled: Vec<usize> = connections
        .iter()
        .enumerate()
        .filter(|(_, c)| c.enabled)
        .map(|(i, _)| i)
        .collect();
    if enabled.is_empty() {
        return;
    }
    let pick = enabled[rng.index(enabled.len())];
    let old = connections[pick];
    connections[pick].enabled = false;

    let (node_id, in_conn, out_conn) = ctx.split_ids(old.innovation, old.from, old.to);
    if !nodes.iter().any(|n| n.id == node_id) {
        nodes.push(NodeGene {
            id: node_id,
            kind: NodeKind::Hidden,
            bias: 0.0,
        });
    }
    connections.push(ConnectionGene {
        innovation: in_conn,
        from: old.from,
        to: node_id,
        weight: 1.0,
        enabled: true,
    });
    connections.push(ConnectionGene {
        innovation: out_conn,
        from: node_id,
        to: old.to,
        weight: old.weight,
        enabled: true,
    });
}

fn toggle_connection(genome: &mut Genome, enable: bool, rng: &mut EvoRng) {
    let (_, connections) = graph_parts_mut(genome);
    let candidates: Vec<usize> = connections
        .iter()
        .enumerate()
        .filter(|(_, c)| c.enabled != enable)
        .map(|(i, _)| i)
        .collect();
    if candidates.is_empty() {
        return;
    }
    let pick = candidates[rng.index(candidates.len())];
    if !enable && creates_dead_output(connections, pick) {
        return;
    }
    connections[pick].enabled = enable;
}

/// Disabling this connection would leave its target with no enabled inputs.
fn creates_dead_output(connections: &[ConnectionGene], index: usize) -> bool {
    let target = connections[index].to;
    connections
        .iter()
        .enumerate()
        .filter(|&(i, c)| i != index && c.enabled && c.to == target)
        .count()
        == 0
}

/// Fitness-biased crossover. Matching genes (same innovation) pick a weight
/// from either parent at random; disjoint and excess genes come from the
/// fitter parent only. A gene disabled in either parent has a 75% chance of
/// staying disabled.
pub fn crossover(fitter: &Genome, other: &Genome, rng: &mut EvoRng) -> Genome {
    let (fit_nodes, fit_conns) = graph_parts(fitter);
    let (_, other_conns) = graph_parts(other);

    let other_by_innovation: HashMap<u32, &ConnectionGene> =
        other_conns.iter().map(|c| (c.innovation, c)).collect();

    let mut connections = Vec::with_capacity(fit_conns.len());
    for conn in fit_conns {
        let mut child = *conn;
        if let Some(matched) = other_by_innovation.get(&conn.innovation) {
            if rng.chance(0.5) {
                child.weight = matched.weight;
            }
            if (!conn.enabled || !matched.enabled) && rng.chance(0.75) {
                child.enabled = false;
            } else {
                child.enabled = true;
            }
        }
        connections.push(child);
    }

    let (inputs, outputs) = match fitter {
        Genome::Graph {
            inputs, outputs, ..
        } => (*inputs, *outputs),
        Genome::Dense { .. } => (0, 0),
    };

    Genome::Graph {
        inputs,
        outputs,
        nodes: fit_nodes.to_vec(),
        connections,
    }
}

/// Compatibility distance `c1*E/N + c2*D/N + c3*W̄`. N is the larger gene
/// count when it exceeds `normalize_above`, else 1.
pub fn compatibility_distance(a: &Genome, b: &Genome, config: &CompatibilityConfig) -> f32 {
    let (_, conns_a) = graph_parts(a);
    let (_, conns_b) = graph_parts(b);
    if conns_a.is_empty() && conns_b.is_empty() {
        return 0.0;
    }

    let max_a = conns_a.iter().map(|c| c.innovation).max().unwrap_or(0);
    let max_b = conns_b.iter().map(|c| c.innovation).max().unwrap_or(0);

    let by_innovation_b: HashMap<u32, &ConnectionGene> =
        conns_b.iter().map(|c| (c.innovation, c)).collect();

    let mut matching = 0usize;
    let mut weight_diff = 0.0f32;
    let mut disjoint = 0usize;
    let mut excess = 0usize;

    for conn in conns_a {
        if let Some(matched) = by_innovation_b.get(&conn.innovation) {
            matching += 1;
            weight_diff += (conn.weight - matched.weight).abs();
        } else if conn.innovation <= max_b {
            disjoint += 1;
        } else {
            excess += 1;
        }
    }
    for conn in conns_b {
        if conns_a.iter().all(|c| c.innovation != conn.innovation) {
            if conn.innovation <= max_a {
                disjoint += 1;
            } else {
                excess += 1;
            }
        }
    }

    let larger = conns_a.len().max(conns_b.len());
    let n = if larger > config.normalize_above {
        larger as f32
    } else {
        1.0
    };
    let avg_weight_diff = if matching > 0 {
        weight_diff / matching as f32
    } else {
        0.0
    };

    config.excess_coeff * excess as f32 / n
        + config.disjoint_coeff * disjoint as f32 / n
        + config.weight_coeff * avg_weight_diff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_and_rng() -> (InnovationContext, EvoRng) {
        (InnovationContext::new(0, 0), EvoRng::new(17))
    }

    #[test]
    fn test_minimal_genome_fully_connected() {
        let (mut ctx, mut rng) = ctx_and_rng();
        let genome = minimal_genome(3, 2, &mut ctx, &mut rng);
        match &genome {
            Genome::Graph {
                nodes, connections, ..
            } => {
                assert_eq!(nodes.len(), 5);
                assert_eq!(connections.len(), 6);
                assert!(connections.iter().all(|c| c.enabled));
            }
            Genome::Dense { .. } => panic!("expected graph genome"),
        }
        assert_eq!(ctx.next_innovation(), 6);
    }

    #[test]
    fn test_innovation_reuse() {
        let mut ctx = InnovationContext::new(0, 10);
        let first = ctx.connection_id(1, 2);
        let again = ctx.connection_id(1, 2);
        assert_eq!(first, again);
        assert_eq!(ctx.connection_id(2, 1), first + 1);
    }

    #[test]
    fn test_split_reuse() {
        let mut ctx = InnovationContext::new(5, 10);
        let first = ctx.split_ids(3, 0, 1);
        let again = ctx.split_ids(3, 0, 1);
        assert_eq!(first, again);
    }

    #[test]
    fn test_add_node_disables_split_connection() {
        let (mut ctx, mut rng) = ctx_and_rng();
        let mut genome = minimal_genome(1, 1, &mut ctx, &mut rng);
        add_node(&mut genome, &mut ctx, &mut rng);
        match &genome {
            Genome::Graph {
                nodes, connections, ..
            } => {
                assert_eq!(nodes.len(), 3);
                assert_eq!(connections.len(), 3);
                assert!(!connections[0].enabled);
                // Bridge into the new node carries weight 1.0.
                let hidden = nodes.iter().find(|n| n.kind == NodeKind::Hidden).unwrap();
                let bridge_in = connections.iter().find(|c| c.to == hidden.id).unwrap();
                assert_eq!(bridge_in.weight, 1.0);
            }
            Genome::Dense { .. } => unreachable!(),
        }
    }

    #[test]
    fn test_add_connection_stays_acyclic() {
        let (mut ctx, mut rng) = ctx_and_rng();
        let mut genome = minimal_genome(2, 2, &mut ctx, &mut rng);
        for _ in 0..10 {
            add_node(&mut genome, &mut ctx, &mut rng);
            add_connection(&mut genome, &mut ctx, &mut rng);
        }
        // Every enabled edge must be consistent with some topological order:
        // removing it, the rest of the graph must not reach back from its
        // target to its source.
        if let Genome::Graph { connections, .. } = &genome {
            for (i, conn) in connections.iter().enumerate().filter(|(_, c)| c.enabled) {
                let others: Vec<ConnectionGene> = connections
                    .iter()
                    .enumerate()
                    .filter(|&(j, c)| j != i && c.enabled)
                    .map(|(_, c)| *c)
                    .collect();
                assert!(!creates_cycle(&others, conn.from, conn.to));
            }
        }
    }

    #[test]
    fn test_zero_distance_for_identical() {
        let (mut ctx, mut rng) = ctx_and_rng();
        let genome = minimal_genome(2, 1, &mut ctx, &mut rng);
        let distance = compatibility_distance(&genome, &genome, &CompatibilityConfig::default());
        assert_eq!(distance, 0.0);
    }

    #[test]
    fn test_distance_counts_excess() {
        let (mut ctx, mut rng) = ctx_and_rng();
        let base = minimal_genome(2, 1, &mut ctx, &mut rng);
        let mut extended = base.clone();
        add_node(&mut extended, &mut ctx, &mut rng);

        let config = CompatibilityConfig::default();
        let distance = compatibility_distance(&base, &extended, &config);
        // The split adds two excess connections; the disabled original still
        // matches. Small genomes are not normalized.
        assert!((distance - 2.0 * config.excess_coeff).abs() < 1e-6);
    }

    #[test]
    fn test_crossover_keeps_fitter_topology() {
        let (mut ctx, mut rng) = ctx_and_rng();
        let plain = minimal_genome(2, 1, &mut ctx, &mut rng);
        let mut complex = plain.clone();
        add_node(&mut complex, &mut ctx, &mut rng);

        let child = crossover(&complex, &plain, &mut rng);
        assert_eq!(child.parameter_count(), complex.parameter_count());
    }
}
