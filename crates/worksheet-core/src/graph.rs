//! Page/tag graph for the corpus overview
//!
//! Pages link to their tags, and tags that appear together on a page are
//! linked with a weight equal to the number of pages they share.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Page,
    Tag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// page -> tag
    Tagged,
    /// tag <-> tag
    CoOccurs,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub weight: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TagGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl TagGraph {
    pub fn build(pages: &[Page]) -> Self {
        let mut graph = TagGraph::default();
        let mut seen_tags: BTreeSet<&str> = BTreeSet::new();
        let mut pairs: BTreeMap<(&str, &str), usize> = BTreeMap::new();

        for page in pages {
            let page_node = page_node_id(page.id);
            graph.nodes.push(GraphNode {
                id: page_node.clone(),
                label: format!("Page {}", page.page_number),
                kind: NodeKind::Page,
                source_name: Some(page.source_name.clone()),
            });

            let tags: Vec<&str> = page.tags.iter().collect();
            for (i, tag) in tags.iter().enumerate() {
                if seen_tags.insert(*tag) {
                    graph.nodes.push(GraphNode {
                        id: tag_node_id(tag),
                        label: tag.to_string(),
                        kind: NodeKind::Tag,
                        source_name: None,
                    });
                }
                graph.edges.push(GraphEdge {
                    source: page_node.clone(),
                    target: tag_node_id(tag),
                    kind: EdgeKind::Tagged,
                    weight: 1,
                });
                // tags iterate sorted, so (a, b) always has a < b
                for other in &tags[i + 1..] {
                    *pairs.entry((*tag, *other)).or_default() += 1;
                }
            }
        }

        graph.edges.extend(pairs.into_iter().map(|((a, b), weight)| GraphEdge {
            source: tag_node_id(a),
            target: tag_node_id(b),
            kind: EdgeKind::CoOccurs,
            weight,
        }));
        graph
    }

    /// Tags sharing at least one page with `tag`, heaviest first.
    pub fn neighbors(&self, tag: &str) -> Vec<(String, usize)> {
        let Some(normalized) = crate::tags::normalize_tag(tag) else {
            return Vec::new();
        };
        let node = tag_node_id(&normalized);
        let mut out: Vec<(String, usize)> = self
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::CoOccurs)
            .filter_map(|e| {
                if e.source == node {
                    Some((e.target.clone(), e.weight))
                } else if e.target == node {
                    Some((e.source.clone(), e.weight))
                } else {
                    None
                }
            })
            .map(|(id, weight)| {
                let tag = id.strip_prefix("tag-").unwrap_or(&id).to_string();
                (tag, weight)
            })
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

fn page_node_id(id: i64) -> String {
    format!("page-{id}")
}

fn tag_node_id(tag: &str) -> String {
    format!("tag-{tag}")
}
