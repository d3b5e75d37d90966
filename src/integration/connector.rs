//! Code Connector (C7): scores how well an orphan file complements a
//! target (main) file and proposes a connection.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::config::ConnectorConfig;
use crate::lang::common::ParseIndex;

/// Extracted signals the connector scores against.
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// File path.
    pub path: String,
    /// Function/method names.
    pub function_names: Vec<String>,
    /// Class names.
    pub class_names: Vec<String>,
    /// Constant names.
    pub constant_names: Vec<String>,
    /// Import module strings.
    pub imports: Vec<String>,
    /// Lower-cased word set drawn from names and doc comments, used for
    /// keyword overlap.
    pub keywords: HashSet<String>,
    /// Rough complexity proxy: total call sites across entities.
    pub complexity: usize,
    /// Whether the file has an entry-point guard.
    pub has_entry_guard: bool,
}

/// Build Capabilities from a parsed file.
pub fn capabilities(path: &str, index: &ParseIndex) -> Capabilities {
    let mut function_names = Vec::new();
    let mut class_names = Vec::new();
    let mut constant_names = Vec::new();
    let mut keywords = HashSet::new();
    let mut complexity = 0;

    for entity in &index.entities {
        use crate::lang::common::EntityKind;
        match entity.kind {
            EntityKind::Function | EntityKind::Method => function_names.push(entity.name.clone()),
            EntityKind::Class => class_names.push(entity.name.clone()),
            EntityKind::Constant => constant_names.push(entity.name.clone()),
        }
        complexity += entity.calls.len();
        for token in tokenize(&entity.name) {
            keywords.insert(token);
        }
        if let Some(doc) = &entity.doc {
            for token in doc.split_whitespace() {
                keywords.insert(token.to_lowercase());
            }
        }
    }

    Capabilities {
        path: path.to_string(),
        function_names,
        class_names,
        constant_names,
        imports: index.imports.iter().map(|i| i.module.clone()).collect(),
        keywords,
        complexity,
        has_entry_guard: index.has_entry_guard,
    }
}

fn tokenize(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for ch in name.chars() {
        if ch == '_' || ch == '-' {
            if !current.is_empty() {
                words.push(current.to_lowercase());
                current.clear();
            }
        } else if ch.is_uppercase() && !current.is_empty() {
            words.push(current.to_lowercase());
            current = ch.to_string();
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        words.push(current.to_lowercase());
    }
    words
}

/// How an accepted suggestion should be wired into the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    /// Import a single function.
    FunctionImport,
    /// Import a single class.
    ClassImport,
    /// Import the whole module.
    ModuleImport,
    /// Import a single constant.
    ConstantImport,
    /// Import a shared utility file wholesale.
    UtilityImport,
    /// Import several named functions.
    SelectiveFunctionImport,
    /// Import several named classes.
    SelectiveClassImport,
}

/// A proposed pairing between an orphan file and a target file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSuggestion {
    /// Orphan file path.
    pub orphan_path: String,
    /// Target (main) file path.
    pub target_path: String,
    /// Composite score in `[0, 1]`.
    pub score: f64,
    /// How the orphan should be wired in.
    pub connection_type: ConnectionType,
    /// Human-readable justification.
    pub reasoning: String,
    /// The raw need component of the composite score, kept separately so
    /// the tie-break rule can compare it without reparsing `reasoning`.
    pub need: f64,
}

/// Score every `(orphan, target)` pair and return suggestions above the
/// confidence threshold, ranked by score then the tie-break rule.
pub fn suggest_connections(
    orphans: &[Capabilities],
    targets: &[Capabilities],
    config: &ConnectorConfig,
) -> Vec<ConnectionSuggestion> {
    let mut suggestions = Vec::new();
    for orphan in orphans {
        for target in targets {
            let semantic = semantic_score(orphan, target);
            let structural = structural_score(orphan, target);
            let dependency = dependency_score(orphan, target);
            let need = need_score(target, orphan);

            let score = config.semantic_weight * semantic
                + config.structural_weight * structural
                + config.dependency_weight * dependency
                + config.need_weight * need;

            if score >= config.confidence_threshold {
                suggestions.push(ConnectionSuggestion {
                    orphan_path: orphan.path.clone(),
                    target_path: target.path.clone(),
                    score,
                    connection_type: classify_connection(orphan),
                    reasoning: format!(
                        "semantic={semantic:.2} structural={structural:.2} dependency={dependency:.2} need={need:.2}"
                    ),
                    need,
                });
            }
        }
    }

    suggestions.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| need_tiebreak(a, b))
            .then_with(|| (a.orphan_path.clone(), a.target_path.clone()).cmp(&(b.orphan_path.clone(), b.target_path.clone())))
    });
    suggestions
}

/// Spec tie-break rule: when two suggestions share a composite score,
/// the one with the higher `need_score` wins before falling back to
/// lexicographic `(orphan_path, target_path)` ordering.
fn need_tiebreak(a: &ConnectionSuggestion, b: &ConnectionSuggestion) -> std::cmp::Ordering {
    b.need.partial_cmp(&a.need).unwrap_or(std::cmp::Ordering::Equal)
}

fn semantic_score(orphan: &Capabilities, target: &Capabilities) -> f64 {
    let keyword_overlap = jaccard(&orphan.keywords, &target.keywords);
    let name_overlap = token_overlap(&orphan.function_names, &target.function_names);
    let doc_overlap = keyword_overlap;
    ((keyword_overlap + name_overlap + doc_overlap) / 3.0).min(1.0)
}

fn structural_score(orphan: &Capabilities, target: &Capabilities) -> f64 {
    let no_conflicts = if orphan.imports.iter().any(|i| target.imports.contains(i)) {
        0.5
    } else {
        1.0
    };
    let complementary = if orphan.function_names.iter().any(|f| !target.function_names.contains(f)) {
        1.0
    } else {
        0.3
    };
    ((no_conflicts + complementary) / 2.0).min(1.0)
}

fn dependency_score(orphan: &Capabilities, target: &Capabilities) -> f64 {
    jaccard(
        &orphan.imports.iter().cloned().collect(),
        &target.imports.iter().cloned().collect(),
    )
}

fn need_score(target: &Capabilities, orphan: &Capabilities) -> f64 {
    let mut need = 0.0;
    if target.complexity == 0 {
        need += 0.4;
    }
    let unresolved: usize = target
        .imports
        .iter()
        .filter(|i| orphan.function_names.contains(i) || orphan.class_names.contains(i))
        .count();
    if unresolved > 0 {
        need += 0.6;
    }
    need.min(1.0)
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn token_overlap(a: &[String], b: &[String]) -> f64 {
    let a_set: HashSet<String> = a.iter().flat_map(|n| tokenize(n)).collect();
    let b_set: HashSet<String> = b.iter().flat_map(|n| tokenize(n)).collect();
    jaccard(&a_set, &b_set)
}

fn classify_connection(orphan: &Capabilities) -> ConnectionType {
    match (
        orphan.function_names.len(),
        orphan.class_names.len(),
        orphan.constant_names.len(),
    ) {
        (1, 0, 0) => ConnectionType::FunctionImport,
        (n, 0, 0) if n > 1 => ConnectionType::SelectiveFunctionImport,
        (0, 1, 0) => ConnectionType::ClassImport,
        (0, n, 0) if n > 1 => ConnectionType::SelectiveClassImport,
        (0, 0, _) => ConnectionType::ConstantImport,
        _ if orphan.function_names.is_empty() && orphan.class_names.is_empty() => ConnectionType::UtilityImport,
        _ => ConnectionType::ModuleImport,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::common::{EntityKind, ImportStatement, ParsedEntity, SourceLocation};

    fn entity(name: &str, kind: EntityKind) -> ParsedEntity {
        ParsedEntity {
            kind,
            name: name.to_string(),
            doc: None,
            calls: Vec::new(),
            is_stub: false,
            location: SourceLocation::from_rows("x", 0, 0),
        }
    }

    #[test]
    fn suggestion_above_threshold_is_returned() {
        let orphan_index = ParseIndex {
            entities: vec![entity("send_email", EntityKind::Function)],
            imports: Vec::new(),
            has_entry_guard: false,
            parse_error: None,
        };
        let target_index = ParseIndex {
            entities: vec![entity("send_notification", EntityKind::Function)],
            imports: vec![ImportStatement {
                module: "send_email".to_string(),
                items: Vec::new(),
                line: 1,
            }],
            has_entry_guard: false,
            parse_error: None,
        };
        let orphan = capabilities("orphan.py", &orphan_index);
        let target = capabilities("main.py", &target_index);
        let config = ConnectorConfig::default();
        let suggestions = suggest_connections(&[orphan], &[target], &config);
        assert!(!suggestions.is_empty());
        assert_eq!(suggestions[0].connection_type, ConnectionType::FunctionImport);
    }
}
