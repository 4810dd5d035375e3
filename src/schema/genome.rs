//! Genome representations for evolved controllers.
//!
//! Two representations coexist behind one enum: a fixed-architecture weight
//! vector (used by the standard GA, NSGA-II, and MAP-Elites engines) and a
//! node/connection graph keyed by innovation ids (used by NEAT). Both are
//! executable: `Genome::activate` runs a forward pass so an episode
//! environment can drive an agent directly from the genome.

use serde::{Deserialize, Serialize};

/// Fixed network architecture for dense genomes.
///
/// Layout: inputs -> hidden (tanh) -> outputs (tanh), weights stored flat as
/// `w_ih | b_h | w_ho | b_o`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    pub inputs: usize,
    pub hidden: usize,
    pub outputs: usize,
}

impl Default for Architecture {
    fn default() -> Self {
        Self {
            inputs: 6,
            hidden: 32,
            outputs: 2,
        }
    }
}

impl Architecture {
    /// Total number of weights in the flat layout.
    pub fn weight_count(&self) -> usize {
        self.inputs * self.hidden + self.hidden + self.hidden * self.outputs + self.outputs
    }
}

/// Node role in a graph genome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Input,
    Hidden,
    Output,
}

/// A node gene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeGene {
    pub id: u32,
    pub kind: NodeKind,
    pub bias: f32,
}

/// A connection gene. `innovation` is assigned by the per-run innovation
/// context the first time this structural mutation occurs in the run and
/// reused for topologically identical mutations afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectionGene {
    pub innovation: u32,
    pub from: u32,
    pub to: u32,
    pub weight: f32,
    pub enabled: bool,
}

/// An evolvable controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "representation")]
pub enum Genome {
    /// Fixed-topology weight vector.
    Dense {
        arch: Architecture,
        weights: Vec<f32>,
    },
    /// NEAT node/connection graph, feed-forward only.
    Graph {
        inputs: usize,
        outputs: usize,
        nodes: Vec<NodeGene>,
        connections: Vec<ConnectionGene>,
    },
}

impl Genome {
    /// Number of evolvable parameters.
    pub fn parameter_count(&self) -> usize {
        match self {
            Genome::Dense { weights, .. } => weights.len(),
            Genome::Graph {
                nodes, connections, ..
            } => nodes.len() + connections.len(),
        }
    }

    /// Run a forward pass. Inputs shorter than the genome expects are
    /// zero-padded; extra inputs are ignored. Outputs are in [-1, 1].
    pub fn activate(&self, inputs: &[f32]) -> Vec<f32> {
        match self {
            Genome::Dense { arch, weights } => activate_dense(arch, weights, inputs),
            Genome::Graph {
                nodes, connections, ..
            } => activate_graph(nodes, connections, inputs),
        }
    }
}

fn activate_dense(arch: &Architecture, weights: &[f32], inputs: &[f32]) -> Vec<f32> {
    let (i, h, o) = (arch.inputs, arch.hidden, arch.outputs);
    let w_ih = &weights[..i * h];
    let b_h = &weights[i * h..i * h + h];
    let w_ho = &weights[i * h + h..i * h + h + h * o];
    let b_o = &weights[i * h + h + h * o..];

    let mut hidden = vec![0.0f32; h];
    for (hi, hv) in hidden.iter_mut().enumerate() {
        let mut sum = b_h[hi];
        let offset = hi * i;
        for ii in 0..i {
            let x = inputs.get(ii).copied().unwrap_or(0.0);
            sum += w_ih[offset + ii] * x;
        }
        *hv = sum.tanh();
    }

    let mut output = vec![0.0f32; o];
    for (oi, ov) in output.iter_mut().enumerate() {
        let mut sum = b_o[oi];
        let offset = oi * h;
        for (hi, hv) in hidden.iter().enumerate() {
            sum += w_ho[offset + hi] * hv;
        }
        *ov = sum.tanh();
    }

    output
}

/// Evaluate a graph genome in topological order (Kahn's algorithm) over the
/// enabled connections. Graphs are feed-forward by construction; a node left
/// out of the order by a malformed cycle keeps its zero activation.
fn activate_graph(nodes: &[NodeGene], connections: &[ConnectionGene], inputs: &[f32]) -> Vec<f32> {
    let n = nodes.len();
    let idx_of = |id: u32| nodes.iter().position(|node| node.id == id);

    let mut incoming: Vec<Vec<(usize, f32)>> = vec![Vec::new(); n];
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0usize; n];

    for conn in connections.iter().filter(|c| c.enabled) {
        if let (Some(from), Some(to)) = (idx_of(conn.from), idx_of(conn.to)) {
            incoming[to].push((from, conn.weight));
            adjacency[from].push(to);
            in_degree[to] += 1;
        }
    }

    let mut order: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut head = 0;
    while head < order.len() {
        let node = order[head];
        head += 1;
        for &next in &adjacency[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                order.push(next);
            }
        }
    }

    let mut activations = vec![0.0f32; n];
    let mut input_cursor = 0usize;
    for (i, node) in nodes.iter().enumerate() {
        if node.kind == NodeKind::Input {
            activations[i] = inputs.get(input_cursor).copied().unwrap_or(0.0);
            input_cursor += 1;
        }
    }

    for &i in &order {
        if nodes[i].kind == NodeKind::Input {
            continue;
        }
        let mut sum = nodes[i].bias;
        for &(from, weight) in &incoming[i] {
            sum += activations[from] * weight;
        }
        activations[i] = sum.tanh();
    }

    nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| node.kind == NodeKind::Output)
        .map(|(i, _)| activations[i])
        .collect()
}
