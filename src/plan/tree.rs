use std::collections::HashMap;

use super::{NodeId, PlanError, PlanNode};

/// A plan hierarchy rebuilt from flat node records.
///
/// Nodes stay in the arena order they were given; parent/child links are ids,
/// resolved through `index`.
#[derive(Debug, Clone)]
pub struct PlanTree {
    nodes: Vec<PlanNode>,
    index: HashMap<NodeId, usize>,
    root: NodeId,
}

/// Rebuilds the hierarchy, attaching children in input order.
///
/// Any child lists already present on the input are replaced. Structural
/// problems are reported, never patched over: several parentless nodes, a
/// parent id that does not exist, or a node that cannot be reached from the
/// root all fail the whole call.
pub fn reconstruct(mut nodes: Vec<PlanNode>) -> Result<PlanTree, PlanError> {
    if nodes.is_empty() {
        return Err(PlanError::EmptyPlan);
    }

    let mut index = HashMap::with_capacity(nodes.len());
    for (position, node) in nodes.iter().enumerate() {
        if index.insert(node.id, position).is_some() {
            return Err(PlanError::DuplicateNode(node.id));
        }
    }

    let mut children: Vec<Vec<NodeId>> = vec![Vec::new(); nodes.len()];
    let mut roots = Vec::new();

    for node in &nodes {
        match node.parent {
            None => roots.push(node.id),
            Some(parent) if parent == node.id => {
                return Err(PlanError::Cyclic { node: node.id });
            }
            Some(parent) => {
                let slot = index.get(&parent).ok_or(PlanError::DanglingParent {
                    node: node.id,
                    parent,
                })?;
                children[*slot].push(node.id);
            }
        }
    }

    let root = match roots.as_slice() {
        [root] => *root,
        [] => return Err(PlanError::Cyclic { node: nodes[0].id }),
        _ => return Err(PlanError::AmbiguousRoot { roots }),
    };

    for (node, attached) in nodes.iter_mut().zip(children) {
        node.children = attached;
    }

    let tree = PlanTree { nodes, index, root };
    tree.ensure_connected()?;
    Ok(tree)
}

impl PlanTree {
    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn root(&self) -> &PlanNode {
        &self.nodes[self.index[&self.root]]
    }

    pub fn get(&self, id: NodeId) -> Option<&PlanNode> {
        self.index.get(&id).map(|position| &self.nodes[*position])
    }

    /// Nodes in arena (flatten) order.
    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Pre-order walk from the root yielding `(depth, node)`; the root is depth 0.
    pub fn walk(&self) -> Vec<(usize, &PlanNode)> {
        let mut visited = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(0, self.root)];

        while let Some((depth, id)) = stack.pop() {
            let Some(node) = self.get(id) else { continue };
            visited.push((depth, node));
            for child in node.children.iter().rev() {
                stack.push((depth + 1, *child));
            }
        }

        visited
    }

    /// Depth of the deepest node; a single-node plan has depth 0.
    pub fn max_depth(&self) -> usize {
        self.walk().into_iter().map(|(depth, _)| depth).max().unwrap_or(0)
    }

    /// Number of nodes strictly below `id`.
    pub fn descendant_count(&self, id: NodeId) -> usize {
        let mut count = 0;
        let mut stack: Vec<NodeId> = match self.get(id) {
            Some(node) => node.children.clone(),
            None => return 0,
        };

        while let Some(current) = stack.pop() {
            count += 1;
            if let Some(node) = self.get(current) {
                stack.extend(node.children.iter().copied());
            }
        }

        count
    }

    fn ensure_connected(&self) -> Result<(), PlanError> {
        let reached = self.walk();
        if reached.len() == self.nodes.len() {
            return Ok(());
        }

        let mut seen = vec![false; self.nodes.len()];
        for (_, node) in &reached {
            seen[self.index[&node.id]] = true;
        }
        let stray = self
            .nodes
            .iter()
            .zip(seen)
            .find(|(_, reached)| !reached)
            .map(|(node, _)| node.id)
            .unwrap_or(self.root);

        Err(PlanError::Cyclic { node: stray })
    }
}
