//! Package Analyzer (C8): builds the internal dependency graph of a
//! multi-file Update Package, classifies each file's role, and computes
//! a topological `integration_order`.

use std::collections::{HashMap, HashSet};

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::Direction;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::lang::common::ParseIndex;
use crate::lang::registry::adapter_for_language;

/// The role a package file plays, used by the Integration Mapper to pick
/// a destination subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Primary implementation file.
    Core,
    /// Shared helper code.
    Utility,
    /// Configuration.
    Config,
    /// Test code.
    Test,
    /// Documentation.
    Documentation,
}

/// One file within an Update Package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageFile {
    /// Path relative to the package root.
    pub path: String,
    /// Raw file content.
    pub content: String,
    /// Language key, if recognized.
    pub language: Option<String>,
    /// Role classification.
    pub role: Role,
    /// Import module strings resolved to other files within the package.
    pub internal_dependencies: Vec<String>,
    /// Import module strings that resolve outside the package.
    pub external_dependencies: Vec<String>,
}

/// Prioritized role classification rules: path/name regex, first match
/// wins, default `Utility`.
fn role_rules() -> Vec<(Role, Regex)> {
    vec![
        (Role::Core, Regex::new(r"(?i)(^|/)(main|core|index|app)\.[a-z]+$").unwrap()),
        (Role::Config, Regex::new(r"(?i)(^|/)(config|settings|\.env|\.ya?ml|\.toml)").unwrap()),
        (Role::Test, Regex::new(r"(?i)(^|/)(test_|tests?/|_test\.|\.test\.|spec\.)").unwrap()),
        (Role::Documentation, Regex::new(r"(?i)(^|/)(readme|docs?/|\.md$)").unwrap()),
    ]
}

fn classify_role(path: &str) -> Role {
    for (role, pattern) in role_rules() {
        if pattern.is_match(path) {
            return role;
        }
    }
    Role::Utility
}

/// Internal edges + external requirements + topo order, per spec §3
/// "Package Dependency Graph".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDependencyGraph {
    /// Files in the package, classified and dependency-annotated.
    pub files: Vec<PackageFile>,
    /// Import strings that resolve outside the package.
    pub external_requirements: Vec<String>,
    /// Files that have no entry guard and are never imported by another
    /// package file (used by the Connector as orphan candidates).
    pub entry_points: Vec<String>,
    /// Files imported by at least one other package file but importing
    /// none (leaf helpers).
    pub utility_files: Vec<String>,
    /// Topological integration order, by file path.
    pub integration_order: Vec<String>,
    /// True if one or more dependency cycles were detected. The cycle's
    /// members still appear in `integration_order`, in discovery order,
    /// rather than being silently dropped.
    pub cycle_detected: bool,
}

/// Parse every file in a package and build its dependency graph.
pub fn analyze_package(mut files: Vec<PackageFile>) -> PackageDependencyGraph {
    let parsed: HashMap<String, ParseIndex> = files
        .iter()
        .filter_map(|f| {
            let language = f.language.as_ref()?;
            let mut adapter = adapter_for_language(language).ok()?;
            let index = adapter.parse(&f.path, &f.content).ok()?;
            Some((f.path.clone(), index))
        })
        .collect();

    for file in &mut files {
        file.role = classify_role(&file.path);
        let Some(index) = parsed.get(&file.path) else {
            continue;
        };
        for import in &index.imports {
            if let Some(target) = resolve_internal(&import.module, &file.path, &files) {
                file.internal_dependencies.push(target);
            } else {
                file.external_dependencies.push(import.module.clone());
            }
        }
    }

    let mut external_requirements: Vec<String> =
        files.iter().flat_map(|f| f.external_dependencies.clone()).collect();
    external_requirements.sort();
    external_requirements.dedup();

    let mut graph: Graph<String, ()> = Graph::new();
    let mut index_of: HashMap<String, NodeIndex> = HashMap::new();
    for file in &files {
        let idx = graph.add_node(file.path.clone());
        index_of.insert(file.path.clone(), idx);
    }
    for file in &files {
        let Some(&from) = index_of.get(&file.path) else { continue };
        for dep in &file.internal_dependencies {
            if let Some(&to) = index_of.get(dep) {
                graph.add_edge(from, to, ());
            }
        }
    }

    let imported: HashSet<&String> = files.iter().flat_map(|f| f.internal_dependencies.iter()).collect();
    let entry_points: Vec<String> = files
        .iter()
        .filter(|f| !imported.contains(&f.path))
        .map(|f| f.path.clone())
        .collect();
    let utility_files: Vec<String> = files
        .iter()
        .filter(|f| imported.contains(&f.path) && f.internal_dependencies.is_empty())
        .map(|f| f.path.clone())
        .collect();

    let (integration_order, cycle_detected) = topo_order(&graph);

    PackageDependencyGraph {
        files,
        external_requirements,
        entry_points,
        utility_files,
        integration_order,
        cycle_detected,
    }
}

fn resolve_internal(module: &str, from_path: &str, files: &[PackageFile]) -> Option<String> {
    let base = std::path::Path::new(from_path).parent().unwrap_or_else(|| std::path::Path::new(""));
    let relative = module.trim_start_matches("./").trim_start_matches("../");
    files
        .iter()
        .find(|f| {
            f.path != from_path
                && (f.path.ends_with(relative)
                    || f.path == base.join(relative).to_string_lossy().as_ref()
                    || std::path::Path::new(&f.path).file_stem().and_then(|s| s.to_str()) == Some(relative))
        })
        .map(|f| f.path.clone())
}

/// DFS-based topological sort. Cycle members are emitted in discovery
/// order rather than removed, and `cycle_detected` is set so callers
/// flag the package for review instead of silently reordering around it.
fn topo_order(graph: &Graph<String, ()>) -> (Vec<String>, bool) {
    let sccs = kosaraju_scc(graph);
    let cycle_detected = sccs.iter().any(|component| {
        component.len() > 1 || component.first().map(|&n| graph.find_edge(n, n).is_some()).unwrap_or(false)
    });

    let mut order = Vec::new();
    let mut visited = HashSet::new();

    fn visit(
        node: NodeIndex,
        graph: &Graph<String, ()>,
        visited: &mut HashSet<NodeIndex>,
        order: &mut Vec<String>,
    ) {
        if !visited.insert(node) {
            return;
        }
        for neighbor in graph.neighbors_directed(node, Direction::Outgoing) {
            visit(neighbor, graph, visited, order);
        }
        order.push(graph[node].clone());
    }

    for node in graph.node_indices() {
        visit(node, graph, &mut visited, &mut order);
    }
    order.reverse();
    (order, cycle_detected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, content: &str) -> PackageFile {
        PackageFile {
            path: path.to_string(),
            content: content.to_string(),
            language: Some("python".to_string()),
            role: Role::Utility,
            internal_dependencies: Vec::new(),
            external_dependencies: Vec::new(),
        }
    }

    #[test]
    fn classifies_role_by_path() {
        assert_eq!(classify_role("tests/test_foo.py"), Role::Test);
        assert_eq!(classify_role("main.py"), Role::Core);
        assert_eq!(classify_role("README.md"), Role::Documentation);
        assert_eq!(classify_role("helpers.py"), Role::Utility);
    }

    #[test]
    fn config_outranks_test_when_a_path_matches_both() {
        assert_eq!(classify_role("tests/config.yaml"), Role::Config);
        assert_eq!(classify_role("test_config.toml"), Role::Config);
    }

    #[test]
    fn computes_integration_order_for_acyclic_package() {
        let files = vec![
            file("main.py", "import helpers\n"),
            file("helpers.py", "x = 1\n"),
        ];
        let graph = analyze_package(files);
        assert!(!graph.cycle_detected);
        let helpers_pos = graph.integration_order.iter().position(|p| p == "helpers.py").unwrap();
        let main_pos = graph.integration_order.iter().position(|p| p == "main.py").unwrap();
        assert!(helpers_pos < main_pos);
    }

    #[test]
    fn detects_cycles_without_dropping_members() {
        let files = vec![
            file("a.py", "import b\n"),
            file("b.py", "import a\n"),
        ];
        let graph = analyze_package(files);
        assert!(graph.cycle_detected);
        assert_eq!(graph.integration_order.len(), 2);
    }
}
