use serde_json::Value;
use tracing::debug;

use super::{NodeId, PlanDocument, PlanError, PlanNode, CHILD_PLAN, CHILD_PLANS, NODE_TYPE};

struct Pending<'a> {
    value: &'a Value,
    path: String,
    parent: Option<NodeId>,
}

/// Flattens a nested plan into pre-order node records.
///
/// Accepts a bare node object, a `{"Plan": ...}` wrapper, or the top-level
/// list PostgreSQL emits for `FORMAT JSON`. Node ids are pre-order positions,
/// so the same payload always flattens to the same ids in the same order.
/// Child lists are left empty; [`super::reconstruct`] fills them.
pub fn flatten(raw: &Value) -> Result<Vec<PlanNode>, PlanError> {
    let (root, root_path) = locate_root(raw)?;

    let mut nodes = Vec::new();
    let mut stack = vec![Pending {
        value: root,
        path: root_path,
        parent: None,
    }];

    while let Some(pending) = stack.pop() {
        let object = pending
            .value
            .as_object()
            .ok_or_else(|| malformed(&pending.path, "plan node must be an object"))?;

        let id = NodeId(nodes.len());
        let children = child_plans(object, &pending.path)?;

        // Reverse so the first child is popped next.
        for (value, path) in children.into_iter().rev() {
            stack.push(Pending {
                value,
                path,
                parent: Some(id),
            });
        }

        nodes.push(PlanNode::from_document(
            id,
            pending.parent,
            PlanDocument::without_children(object),
        ));
    }

    debug!("Flattened plan into {} nodes", nodes.len());
    Ok(nodes)
}

fn locate_root(raw: &Value) -> Result<(&Value, String), PlanError> {
    let (candidate, path) = match raw {
        Value::Array(items) => (
            items
                .first()
                .ok_or_else(|| malformed("/", "plan list is empty"))?,
            "/0".to_string(),
        ),
        other => (other, "/".to_string()),
    };

    let object = candidate
        .as_object()
        .ok_or_else(|| malformed(&path, "plan root must be an object"))?;

    if object.is_empty() {
        return Err(malformed(&path, "plan root is missing"));
    }

    // A wrapper carries run-level fields (Planning Time, Triggers) around the root node.
    if !object.contains_key(NODE_TYPE) {
        if let Some(inner) = object.get(CHILD_PLAN) {
            return Ok((inner, join_path(&path, CHILD_PLAN)));
        }
    }

    Ok((candidate, path))
}

fn child_plans<'a>(
    object: &'a serde_json::Map<String, Value>,
    path: &str,
) -> Result<Vec<(&'a Value, String)>, PlanError> {
    let mut children = Vec::new();

    if let Some(single) = object.get(CHILD_PLAN) {
        children.push((single, join_path(path, CHILD_PLAN)));
    }

    if let Some(plans) = object.get(CHILD_PLANS) {
        let plans_path = join_path(path, CHILD_PLANS);
        let list = plans
            .as_array()
            .ok_or_else(|| malformed(&plans_path, "\"Plans\" must be a list"))?;

        for (index, child) in list.iter().enumerate() {
            children.push((child, join_path(&plans_path, &index.to_string())));
        }
    }

    Ok(children)
}

fn join_path(base: &str, segment: &str) -> String {
    if base == "/" {
        format!("/{}", segment)
    } else {
        format!("{}/{}", base, segment)
    }
}

fn malformed(path: &str, reason: &str) -> PlanError {
    PlanError::Malformed {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}
