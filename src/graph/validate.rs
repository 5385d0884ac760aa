use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::VulnerabilityPolicy;

use super::model::{Edge, ThreatGraph, Vertex, VertexType};

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphViolation {
    #[error("graph must be a JSON object")]
    NotAnObject,

    #[error("unexpected top-level key '{key}'")]
    UnexpectedKey { key: String },

    #[error("top-level '{key}' must be an array")]
    MissingArray { key: String },

    #[error("{item} is missing required field '{field}'")]
    MissingField { item: String, field: String },

    #[error("{item} field '{field}' must be {expected}")]
    InvalidField {
        item: String,
        field: String,
        expected: String,
    },

    #[error("{item} has unknown vertex type '{value}'")]
    UnknownVertexType { item: String, value: String },

    #[error("{item} has an empty id")]
    EmptyVertexId { item: String },

    #[error("vertex id '{id}' is used more than once")]
    DuplicateVertexId { id: String },

    #[error("edges[{edge}] {endpoint} '{id}' does not reference a vertex")]
    DanglingEdge {
        edge: usize,
        endpoint: String,
        id: String,
    },

    #[error("unwanted incident '{id}' has no outgoing edge to an asset")]
    IncidentWithoutAsset { id: String },

    #[error("edges[{edge}] links mitigation '{mitigation}' to {counterpart_type} '{counterpart}', expected a threat_scenario")]
    MitigationCounterpart {
        edge: usize,
        mitigation: String,
        counterpart: String,
        counterpart_type: String,
    },

    #[error("vulnerability '{vulnerability}' appears on edges {edges:?}")]
    DuplicateVulnerability {
        vulnerability: String,
        edges: Vec<usize>,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("threat graph has {} violation(s): {}", .violations.len(), describe(.violations))]
pub struct ValidationError {
    pub violations: Vec<GraphViolation>,
}

fn describe(violations: &[GraphViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<String>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedGraph {
    pub graph: ThreatGraph,
    pub advisories: Vec<GraphViolation>,
}

pub fn validate_value(
    value: &Value,
    policy: VulnerabilityPolicy,
) -> Result<ValidatedGraph, ValidationError> {
    let graph = read_schema(value).map_err(|violations| ValidationError { violations })?;
    validate_graph(graph, policy)
}

pub fn validate_graph(
    graph: ThreatGraph,
    policy: VulnerabilityPolicy,
) -> Result<ValidatedGraph, ValidationError> {
    let mut violations = Vec::<GraphViolation>::new();
    let mut advisories = Vec::<GraphViolation>::new();

    let mut kinds = BTreeMap::<&str, VertexType>::new();
    for vertex in &graph.vertices {
        if kinds.insert(vertex.id.as_str(), vertex.kind).is_some() {
            violations.push(GraphViolation::DuplicateVertexId {
                id: vertex.id.clone(),
            });
        }
    }

    for (position, edge) in graph.edges.iter().enumerate() {
        for (endpoint, id) in [("source", &edge.source), ("target", &edge.target)] {
            if !kinds.contains_key(id.as_str()) {
                violations.push(GraphViolation::DanglingEdge {
                    edge: position,
                    endpoint: endpoint.to_string(),
                    id: id.clone(),
                });
            }
        }
    }

    for incident in graph
        .vertices
        .iter()
        .filter(|vertex| vertex.kind == VertexType::UnwantedIncident)
    {
        let reaches_asset = graph
            .outgoing(&incident.id)
            .any(|edge| kinds.get(edge.target.as_str()) == Some(&VertexType::Asset));
        if !reaches_asset {
            violations.push(GraphViolation::IncidentWithoutAsset {
                id: incident.id.clone(),
            });
        }
    }

    for (position, edge) in graph.edges.iter().enumerate() {
        let source = kinds.get(edge.source.as_str()).copied();
        let target = kinds.get(edge.target.as_str()).copied();
        let pairs = [
            (source, &edge.source, target, &edge.target),
            (target, &edge.target, source, &edge.source),
        ];
        for (kind, mitigation, counterpart_kind, counterpart) in pairs {
            if kind != Some(VertexType::Mitigation) {
                continue;
            }
            // dangling endpoints are already reported above
            let Some(counterpart_kind) = counterpart_kind else {
                continue;
            };
            if counterpart_kind != VertexType::ThreatScenario {
                violations.push(GraphViolation::MitigationCounterpart {
                    edge: position,
                    mitigation: mitigation.clone(),
                    counterpart: counterpart.clone(),
                    counterpart_type: counterpart_kind.as_str().to_string(),
                });
            }
        }
    }

    let duplicates = duplicate_vulnerabilities(&graph.edges);
    match policy {
        VulnerabilityPolicy::Reject => violations.extend(duplicates),
        VulnerabilityPolicy::Advisory => advisories.extend(duplicates),
    }

    if violations.is_empty() {
        Ok(ValidatedGraph { graph, advisories })
    } else {
        Err(ValidationError { violations })
    }
}

fn duplicate_vulnerabilities(edges: &[Edge]) -> Vec<GraphViolation> {
    let mut seen = BTreeMap::<&str, Vec<usize>>::new();
    for (position, edge) in edges.iter().enumerate() {
        let mut on_this_edge = HashSet::<&str>::new();
        for vulnerability in &edge.vulnerabilities {
            if on_this_edge.insert(vulnerability.as_str()) {
                seen.entry(vulnerability.as_str()).or_default().push(position);
            }
        }
    }

    seen.into_iter()
        .filter(|(_, positions)| positions.len() > 1)
        .map(|(vulnerability, edges)| GraphViolation::DuplicateVulnerability {
            vulnerability: vulnerability.to_string(),
            edges,
        })
        .collect()
}

fn read_schema(value: &Value) -> Result<ThreatGraph, Vec<GraphViolation>> {
    let Value::Object(root) = value else {
        return Err(vec![GraphViolation::NotAnObject]);
    };

    let mut violations = Vec::<GraphViolation>::new();
    for key in root.keys() {
        if key != "vertices" && key != "edges" {
            violations.push(GraphViolation::UnexpectedKey { key: key.clone() });
        }
    }

    let vertex_items = top_level_array(root, "vertices", &mut violations);
    let edge_items = top_level_array(root, "edges", &mut violations);

    let mut vertices = Vec::<Vertex>::with_capacity(vertex_items.len());
    for (position, item) in vertex_items.iter().enumerate() {
        let label = format!("vertices[{position}]");
        let Some(object) = item_object(item, &label, &mut violations) else {
            continue;
        };

        let id = required_string(object, &label, "id", &mut violations);
        let kind = required_string(object, &label, "type", &mut violations).and_then(|raw| {
            let parsed = VertexType::parse(&raw);
            if parsed.is_none() {
                violations.push(GraphViolation::UnknownVertexType {
                    item: label.clone(),
                    value: raw,
                });
            }
            parsed
        });
        let text = required_string(object, &label, "text", &mut violations);

        if id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            violations.push(GraphViolation::EmptyVertexId {
                item: label.clone(),
            });
        }

        if let (Some(id), Some(kind), Some(text)) = (id, kind, text) {
            vertices.push(Vertex { id, kind, text });
        }
    }

    let mut edges = Vec::<Edge>::with_capacity(edge_items.len());
    for (position, item) in edge_items.iter().enumerate() {
        let label = format!("edges[{position}]");
        let Some(object) = item_object(item, &label, &mut violations) else {
            continue;
        };

        let source = required_string(object, &label, "source", &mut violations);
        let target = required_string(object, &label, "target", &mut violations);
        let vulnerabilities = match object.get("vulnerabilities") {
            None | Some(Value::Null) => Some(Vec::new()),
            Some(Value::Array(values)) => {
                let strings = values
                    .iter()
                    .filter_map(|value| value.as_str().map(str::to_string))
                    .collect::<Vec<String>>();
                if strings.len() == values.len() {
                    Some(strings)
                } else {
                    violations.push(invalid_field(&label, "vulnerabilities", "an array of strings"));
                    None
                }
            }
            Some(_) => {
                violations.push(invalid_field(&label, "vulnerabilities", "an array of strings"));
                None
            }
        };

        if let (Some(source), Some(target), Some(vulnerabilities)) = (source, target, vulnerabilities) {
            edges.push(Edge {
                source,
                target,
                vulnerabilities,
            });
        }
    }

    if violations.is_empty() {
        Ok(ThreatGraph { vertices, edges })
    } else {
        Err(violations)
    }
}

fn top_level_array<'a>(
    root: &'a Map<String, Value>,
    key: &str,
    violations: &mut Vec<GraphViolation>,
) -> &'a [Value] {
    match root.get(key) {
        Some(Value::Array(items)) => items,
        _ => {
            violations.push(GraphViolation::MissingArray {
                key: key.to_string(),
            });
            &[]
        }
    }
}

fn item_object<'a>(
    item: &'a Value,
    label: &str,
    violations: &mut Vec<GraphViolation>,
) -> Option<&'a Map<String, Value>> {
    let object = item.as_object();
    if object.is_none() {
        violations.push(GraphViolation::InvalidField {
            item: label.to_string(),
            field: "<item>".to_string(),
            expected: "an object".to_string(),
        });
    }
    object
}

fn required_string(
    object: &Map<String, Value>,
    label: &str,
    field: &str,
    violations: &mut Vec<GraphViolation>,
) -> Option<String> {
    match object.get(field) {
        Some(Value::String(value)) => Some(value.clone()),
        None | Some(Value::Null) => {
            violations.push(GraphViolation::MissingField {
                item: label.to_string(),
                field: field.to_string(),
            });
            None
        }
        Some(_) => {
            violations.push(invalid_field(label, field, "a string"));
            None
        }
    }
}

fn invalid_field(label: &str, field: &str, expected: &str) -> GraphViolation {
    GraphViolation::InvalidField {
        item: label.to_string(),
        field: field.to_string(),
        expected: expected.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn wearable_graph() -> Value {
        json!({
            "vertices": [
                {"id": "T1", "type": "human_threat_malicious", "text": "Attacker within Bluetooth range"},
                {"id": "S1", "type": "threat_scenario", "text": "Vitals intercepted over unencrypted Bluetooth"},
                {"id": "U1", "type": "unwanted_incident", "text": "Disclosure of patient data"},
                {"id": "A1", "type": "asset", "text": "patient vitals data"},
                {"id": "M1", "type": "mitigation", "text": "Enforce BLE pairing with encryption"}
            ],
            "edges": [
                {"source": "T1", "target": "S1", "vulnerabilities": ["CWE-319"]},
                {"source": "S1", "target": "U1", "vulnerabilities": []},
                {"source": "U1", "target": "A1"},
                {"source": "M1", "target": "S1", "vulnerabilities": []}
            ]
        })
    }

    fn violations_of(value: Value, policy: VulnerabilityPolicy) -> Vec<GraphViolation> {
        validate_value(&value, policy)
            .expect_err("graph should be rejected")
            .violations
    }

    #[test]
    fn graph_satisfying_all_constraints_is_accepted() {
        let validated =
            validate_value(&wearable_graph(), VulnerabilityPolicy::Advisory).expect("valid graph");
        assert_eq!(validated.graph.vertices.len(), 5);
        assert_eq!(validated.graph.edges.len(), 4);
        assert!(validated.graph.edges[2].vulnerabilities.is_empty());
        assert!(validated.advisories.is_empty());
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let mut value = wearable_graph();
        value["edges"][0]["target"] = json!("S9");

        let violations = violations_of(value, VulnerabilityPolicy::Advisory);
        assert!(violations.contains(&GraphViolation::DanglingEdge {
            edge: 0,
            endpoint: "target".to_string(),
            id: "S9".to_string(),
        }));
    }

    #[test]
    fn incident_without_asset_edge_is_rejected() {
        let mut value = wearable_graph();
        value["edges"]
            .as_array_mut()
            .expect("edges array")
            .remove(2);

        let violations = violations_of(value, VulnerabilityPolicy::Advisory);
        assert_eq!(
            violations,
            vec![GraphViolation::IncidentWithoutAsset {
                id: "U1".to_string()
            }]
        );
    }

    #[test]
    fn incoming_asset_edge_does_not_satisfy_incident() {
        let mut value = wearable_graph();
        value["edges"][2] = json!({"source": "A1", "target": "U1"});

        let violations = violations_of(value, VulnerabilityPolicy::Advisory);
        assert!(violations.contains(&GraphViolation::IncidentWithoutAsset {
            id: "U1".to_string()
        }));
    }

    #[test]
    fn mitigation_must_attach_to_threat_scenario() {
        let mut value = wearable_graph();
        value["edges"][3] = json!({"source": "M1", "target": "A1"});

        let violations = violations_of(value, VulnerabilityPolicy::Advisory);
        assert!(matches!(
            violations.as_slice(),
            [GraphViolation::MitigationCounterpart { counterpart_type, .. }] if counterpart_type == "asset"
        ));
    }

    #[test]
    fn schema_violations_are_collected_together() {
        let value = json!({
            "vertices": [
                {"id": "T1", "type": "attacker", "text": "x"},
                {"type": "asset", "text": "y"}
            ],
            "edges": [{"source": "T1", "target": 3}],
            "notes": "extra"
        });

        let violations = violations_of(value, VulnerabilityPolicy::Advisory);
        assert!(violations.contains(&GraphViolation::UnexpectedKey {
            key: "notes".to_string()
        }));
        assert!(violations.contains(&GraphViolation::UnknownVertexType {
            item: "vertices[0]".to_string(),
            value: "attacker".to_string(),
        }));
        assert!(violations.contains(&GraphViolation::MissingField {
            item: "vertices[1]".to_string(),
            field: "id".to_string(),
        }));
        assert!(violations.contains(&GraphViolation::InvalidField {
            item: "edges[0]".to_string(),
            field: "target".to_string(),
            expected: "a string".to_string(),
        }));
    }

    #[test]
    fn missing_top_level_arrays_are_reported() {
        let violations = violations_of(json!({"vertices": []}), VulnerabilityPolicy::Advisory);
        assert_eq!(
            violations,
            vec![GraphViolation::MissingArray {
                key: "edges".to_string()
            }]
        );
        assert_eq!(
            violations_of(json!([1, 2]), VulnerabilityPolicy::Advisory),
            vec![GraphViolation::NotAnObject]
        );
    }

    #[test]
    fn duplicate_vertex_ids_are_rejected() {
        let mut value = wearable_graph();
        value["vertices"][4]["id"] = json!("T1");
        value["edges"][3]["source"] = json!("S1");
        value["edges"][3]["target"] = json!("U1");

        let violations = violations_of(value, VulnerabilityPolicy::Advisory);
        assert!(violations.contains(&GraphViolation::DuplicateVertexId {
            id: "T1".to_string()
        }));
    }

    #[test]
    fn repeated_vulnerability_follows_policy() {
        let mut value = wearable_graph();
        value["edges"][1]["vulnerabilities"] = json!(["CWE-319"]);

        let advisory =
            validate_value(&value, VulnerabilityPolicy::Advisory).expect("advisory accepts");
        assert_eq!(
            advisory.advisories,
            vec![GraphViolation::DuplicateVulnerability {
                vulnerability: "CWE-319".to_string(),
                edges: vec![0, 1],
            }]
        );

        let rejected = violations_of(value, VulnerabilityPolicy::Reject);
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn validation_error_display_lists_violations() {
        let err = ValidationError {
            violations: vec![GraphViolation::IncidentWithoutAsset {
                id: "U1".to_string(),
            }],
        };
        assert_eq!(
            err.to_string(),
            "threat graph has 1 violation(s): unwanted incident 'U1' has no outgoing edge to an asset"
        );
    }
}
