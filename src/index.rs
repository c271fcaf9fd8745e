use crate::graph::ExecutionGraph;

/// Title and class-type lookup over an [`ExecutionGraph`].
///
/// Built from a graph snapshot and replaced whenever the graph is reloaded.
/// Input edits never change titles or class types, so the index stays valid
/// across them.
#[derive(Debug, Clone, Default)]
pub struct NodeIndex {
    /// `(trimmed class_type, node id)` in graph order.
    by_class: Vec<(String, String)>,
    /// `(trimmed title, node id)` in graph order.
    by_title: Vec<(String, String)>,
}

impl NodeIndex {
    pub fn build(graph: &ExecutionGraph) -> Self {
        let mut by_class = Vec::with_capacity(graph.len());
        let mut by_title = Vec::with_capacity(graph.len());
        for (id, node) in graph.iter() {
            by_class.push((node.class_type.trim().to_string(), id.to_string()));
            by_title.push((node.title().trim().to_string(), id.to_string()));
        }
        Self { by_class, by_title }
    }

    /// Resolve a node id by class type, then by title.
    ///
    /// Every node is checked for a matching `class_type` before any title is
    /// considered, so a class-type match always wins. Both sides are compared
    /// with surrounding whitespace trimmed.
    pub fn find_by_title(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.by_class
            .iter()
            .chain(&self.by_title)
            .find(|(key, _)| key == name)
            .map(|(_, id)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_class.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_class.is_empty()
    }
}
