use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexType {
    HumanThreatNonMalicious,
    HumanThreatMalicious,
    NonHumanThreat,
    ThreatScenario,
    UnwantedIncident,
    Asset,
    Mitigation,
}

impl VertexType {
    pub const ALL: [VertexType; 7] = [
        Self::HumanThreatNonMalicious,
        Self::HumanThreatMalicious,
        Self::NonHumanThreat,
        Self::ThreatScenario,
        Self::UnwantedIncident,
        Self::Asset,
        Self::Mitigation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HumanThreatNonMalicious => "human_threat_non_malicious",
            Self::HumanThreatMalicious => "human_threat_malicious",
            Self::NonHumanThreat => "non_human_threat",
            Self::ThreatScenario => "threat_scenario",
            Self::UnwantedIncident => "unwanted_incident",
            Self::Asset => "asset",
            Self::Mitigation => "mitigation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::HumanThreatNonMalicious => "Human threat (non-malicious)",
            Self::HumanThreatMalicious => "Human threat (malicious)",
            Self::NonHumanThreat => "Non-human threat",
            Self::ThreatScenario => "Threat scenario",
            Self::UnwantedIncident => "Unwanted incident",
            Self::Asset => "Asset",
            Self::Mitigation => "Mitigation",
        }
    }
}

impl fmt::Display for VertexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: VertexType,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub vulnerabilities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThreatGraph {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
}

impl ThreatGraph {
    pub fn vertex(&self, id: &str) -> Option<&Vertex> {
        self.vertices.iter().find(|vertex| vertex.id == id)
    }

    pub fn vertices_of(&self, kind: VertexType) -> impl Iterator<Item = &Vertex> {
        self.vertices.iter().filter(move |vertex| vertex.kind == kind)
    }

    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| edge.source == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_type_round_trips_snake_case_names() {
        for kind in VertexType::ALL {
            let encoded = serde_json::to_string(&kind).expect("encode");
            assert_eq!(encoded, format!("\"{}\"", kind.as_str()));
            assert_eq!(VertexType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(VertexType::parse("attacker"), None);
    }

    #[test]
    fn edge_vulnerabilities_default_to_empty() {
        let edge: Edge =
            serde_json::from_str(r#"{"source": "a", "target": "b"}"#).expect("edge parses");
        assert!(edge.vulnerabilities.is_empty());
    }

    #[test]
    fn graph_rejects_extra_top_level_keys() {
        let parsed = serde_json::from_str::<ThreatGraph>(
            r#"{"vertices": [], "edges": [], "notes": "extra"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn vertex_uses_type_key() {
        let vertex: Vertex =
            serde_json::from_str(r#"{"id": "A1", "type": "asset", "text": "patient vitals data"}"#)
                .expect("vertex parses");
        assert_eq!(vertex.kind, VertexType::Asset);
    }
}
