use std::collections::{HashMap, HashSet};

use super::{DiagnosticForm, NodeRef, MAX_TIME_LIMIT_MINUTES};

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

impl DiagnosticForm {
    /// Check the structural invariants of the decision graph.
    ///
    /// Returns every problem found rather than stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.form_id.trim().is_empty() {
            problems.push("form_id must not be empty".to_string());
        }
        if self.items.is_empty() {
            problems.push("form must contain at least one item".to_string());
        }
        if self.max_depth < 1 {
            problems.push("max_depth must be at least 1".to_string());
        }
        if !(1..=MAX_TIME_LIMIT_MINUTES).contains(&self.max_time_minutes) {
            problems.push(format!(
                "max_time_minutes must be within 1-{}, got {}",
                MAX_TIME_LIMIT_MINUTES, self.max_time_minutes
            ));
        }
        if !self.items.iter().any(|i| i.item_id == self.root_item_id) {
            problems.push(format!(
                "root item {} is not one of the form's items",
                self.root_item_id
            ));
        }

        let mut seen = HashSet::new();
        for node in self.nodes() {
            if !seen.insert(node.id()) {
                problems.push(format!("node id {} is used more than once", node.id()));
            }
            check_node(self, node, &mut problems);
        }

        let mut edge_keys = HashSet::new();
        for edge in &self.edges {
            let Some(from) = self.node(&edge.from_node_id) else {
                problems.push(format!(
                    "edge from {} references a missing node",
                    edge.from_node_id
                ));
                continue;
            };
            if !edge_keys.insert((edge.from_node_id.as_str(), edge.option_selected.as_str())) {
                problems.push(format!(
                    "more than one edge for option {} of node {}",
                    edge.option_selected, edge.from_node_id
                ));
            }
            if !from.has_option(&edge.option_selected) {
                problems.push(format!(
                    "edge from {} uses unknown option {}",
                    edge.from_node_id, edge.option_selected
                ));
            }
            if let Some(to) = &edge.to_node_id {
                if self.node(to).is_none() {
                    problems.push(format!(
                        "edge {} -> {} references a missing node",
                        edge.from_node_id, to
                    ));
                }
            }
            if let Some(delta) = edge.confidence_delta {
                if !(0.0..=1.0).contains(&delta) {
                    problems.push(format!(
                        "edge from {} option {} has confidence_delta {} outside 0.0-1.0",
                        edge.from_node_id, edge.option_selected, delta
                    ));
                }
            }
            if let Some(tag) = &edge.misconception_tag {
                match from.distractor(&edge.option_selected) {
                    Some(d) if &d.misconception_tag != tag => problems.push(format!(
                        "edge from {} option {} is tagged {} but the distractor is tagged {}",
                        edge.from_node_id, edge.option_selected, tag, d.misconception_tag
                    )),
                    None if from.has_option(&edge.option_selected) => problems.push(format!(
                        "edge from {} tags the correct answer {} with {}",
                        edge.from_node_id, edge.option_selected, tag
                    )),
                    _ => {}
                }
            }
        }

        if let Some(cycle_at) = find_cycle(self) {
            problems.push(format!("decision graph contains a cycle through {}", cycle_at));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

fn check_node(form: &DiagnosticForm, node: NodeRef<'_>, problems: &mut Vec<String>) {
    let mut options = HashSet::new();
    for option in node.option_ids() {
        if !options.insert(option) {
            problems.push(format!(
                "node {} has duplicate option id {}",
                node.id(),
                option
            ));
        }
    }
    for distractor in node.distractors() {
        if !(0.0..=1.0).contains(&distractor.confidence_weight) {
            problems.push(format!(
                "node {} option {} has confidence_weight {} outside 0.0-1.0",
                node.id(),
                distractor.option_id,
                distractor.confidence_weight
            ));
        }
        if distractor.misconception_tag.trim().is_empty() {
            problems.push(format!(
                "node {} option {} has an empty misconception_tag",
                node.id(),
                distractor.option_id
            ));
        }
        if let Some(probe_id) = &distractor.next_probe_id {
            if !form.probes.iter().any(|p| &p.probe_id == probe_id) {
                problems.push(format!(
                    "node {} option {} points at missing probe {}",
                    node.id(),
                    distractor.option_id,
                    probe_id
                ));
            }
        }
    }
}

/// Depth-first search for a back edge reachable from the root.
fn find_cycle(form: &DiagnosticForm) -> Option<String> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &form.edges {
        if let Some(to) = &edge.to_node_id {
            adjacency
                .entry(edge.from_node_id.as_str())
                .or_default()
                .push(to.as_str());
        }
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<(&str, usize)> = vec![(form.root_item_id.as_str(), 0)];
    marks.insert(form.root_item_id.as_str(), Mark::Visiting);

    while let Some((node, next_child)) = stack.pop() {
        let children = adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]);
        if let Some(&child) = children.get(next_child) {
            stack.push((node, next_child + 1));
            match marks.get(child) {
                Some(Mark::Visiting) => return Some(child.to_string()),
                Some(Mark::Done) => {}
                None => {
                    marks.insert(child, Mark::Visiting);
                    stack.push((child, 0));
                }
            }
        } else {
            marks.insert(node, Mark::Done);
        }
    }
    None
}
