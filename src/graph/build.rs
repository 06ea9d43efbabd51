//! # Graph construction from blueprints
use crate::error::Result;

use super::blueprint::{FeatureType, GraphBlueprint};
use super::{Graph, NodeId};

/// Materialise the sequence graph for a blueprint, assigning node ids to
/// every feature in place. Nodes are numbered in blueprint order so that the
/// node id order reflects the left-to-right layout of the locus.
pub fn build_graph(blueprint: &mut GraphBlueprint) -> Result<Graph> {
    let mut node_seqs: Vec<Vec<u8>> = Vec::new();
    for feature in blueprint.iter_mut() {
        feature.node_ids = feature
            .sequences
            .iter()
            .map(|sequence| {
                node_seqs.push(sequence.as_bytes().to_vec());
                (node_seqs.len() - 1) as NodeId
            })
            .collect();
    }

    let mut graph = Graph::new(node_seqs);

    // `open_nodes` holds every node that may connect directly to the next
    // feature; skippable features leave their predecessors open as well,
    // which is what creates bypass edges.
    let mut open_nodes: Vec<NodeId> = Vec::new();
    for feature in blueprint.iter() {
        match feature.feature_type {
            FeatureType::LeftFlank
            | FeatureType::RightFlank
            | FeatureType::Interruption => {
                let node = feature.node_ids[0];
                for &open in &open_nodes {
                    graph.add_edge(open, node)?;
                }
                open_nodes = vec![node];
            }
            FeatureType::UnskippableRepeat => {
                let node = feature.node_ids[0];
                for &open in &open_nodes {
                    graph.add_edge(open, node)?;
                }
                graph.add_edge(node, node)?;
                open_nodes = vec![node];
            }
            FeatureType::SkippableRepeat => {
                let node = feature.node_ids[0];
                for &open in &open_nodes {
                    graph.add_edge(open, node)?;
                }
                graph.add_edge(node, node)?;
                open_nodes.push(node);
            }
            FeatureType::InsertionOrDeletion => {
                for &node in &feature.node_ids {
                    for &open in &open_nodes {
                        graph.add_edge(open, node)?;
                    }
                }
                open_nodes.extend(feature.node_ids.iter().copied());
            }
            FeatureType::Swap => {
                for &node in &feature.node_ids {
                    for &open in &open_nodes {
                        graph.add_edge(open, node)?;
                    }
                }
                open_nodes = feature.node_ids.clone();
            }
        }
    }

    Ok(graph)
}
