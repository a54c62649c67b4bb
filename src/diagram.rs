//! Process-variant flow diagrams.
//!
//! A variant is a comma-separated list of steps. Its diagram is a path
//! graph: one node per token, one edge from each step to the next. Tokens
//! are neither trimmed nor merged, so repeated steps get distinct nodes.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Separator between step names in a variant string.
pub const VARIANT_DELIMITER: char = ',';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramNode {
    /// Position of the step in the variant, starting at 0
    pub id: usize,
    /// Raw step name
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramEdge {
    pub source: usize,
    pub target: usize,
}

/// Directed path graph of one process variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDiagram {
    pub nodes: Vec<DiagramNode>,
    pub edges: Vec<DiagramEdge>,
}

/// Builds the diagram of a variant string.
///
/// `""` yields a single empty-labelled node; text without a delimiter
/// yields a single node. Never fails.
pub fn build_diagram(variant_text: &str) -> ProcessDiagram {
    let nodes: Vec<DiagramNode> = variant_text
        .split(VARIANT_DELIMITER)
        .enumerate()
        .map(|(id, label)| DiagramNode {
            id,
            label: label.to_string(),
        })
        .collect();

    let edges = (1..nodes.len())
        .map(|target| DiagramEdge {
            source: target - 1,
            target,
        })
        .collect();

    ProcessDiagram { nodes, edges }
}

impl ProcessDiagram {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Node labels in path order.
    pub fn labels(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.label.as_str()).collect()
    }

    /// Renders the diagram as Graphviz DOT, laid out left to right.
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph {\n    rankdir=LR;\n");
        for node in &self.nodes {
            // writing into a String cannot fail
            let _ = writeln!(dot, "    {} [label=\"{}\"];", node.id, escape_label(&node.label));
        }
        for edge in &self.edges {
            let _ = writeln!(dot, "    {} -> {};", edge.source, edge.target);
        }
        dot.push('}');
        dot.push('\n');
        dot
    }
}

fn escape_label(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_pairs(diagram: &ProcessDiagram) -> Vec<(usize, usize)> {
        diagram
            .edges
            .iter()
            .map(|edge| (edge.source, edge.target))
            .collect()
    }

    #[test]
    fn test_empty_string_is_one_empty_node() {
        let diagram = build_diagram("");
        assert_eq!(diagram.labels(), vec![""]);
        assert_eq!(diagram.edge_count(), 0);
    }

    #[test]
    fn test_single_step() {
        let diagram = build_diagram("A");
        assert_eq!(diagram.labels(), vec!["A"]);
        assert_eq!(diagram.edge_count(), 0);
    }

    #[test]
    fn test_three_steps_form_a_path() {
        let diagram = build_diagram("A,B,C");
        assert_eq!(diagram.labels(), vec!["A", "B", "C"]);
        assert_eq!(
            diagram.nodes.iter().map(|node| node.id).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(edge_pairs(&diagram), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_repeated_steps_stay_distinct() {
        let diagram = build_diagram("A,A");
        assert_eq!(diagram.node_count(), 2);
        assert_eq!(diagram.labels(), vec!["A", "A"]);
        assert_eq!(edge_pairs(&diagram), vec![(0, 1)]);
    }

    #[test]
    fn test_tokens_are_not_trimmed() {
        let diagram = build_diagram("Fill, Seal,,");
        assert_eq!(diagram.labels(), vec!["Fill", " Seal", "", ""]);
        assert_eq!(diagram.edge_count(), 3);
    }

    #[test]
    fn test_build_is_deterministic() {
        assert_eq!(build_diagram("Fill,Seal,Label"), build_diagram("Fill,Seal,Label"));
    }

    #[test]
    fn test_to_dot() {
        let dot = build_diagram("Fill,\"Seal\"").to_dot();
        assert_eq!(
            dot,
            "digraph {\n    rankdir=LR;\n    0 [label=\"Fill\"];\n    1 [label=\"\\\"Seal\\\"\"];\n    0 -> 1;\n}\n"
        );
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(build_diagram("A,B")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "nodes": [{"id": 0, "label": "A"}, {"id": 1, "label": "B"}],
                "edges": [{"source": 0, "target": 1}]
            })
        );
    }
}
