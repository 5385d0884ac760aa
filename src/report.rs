use crate::graph::{ThreatGraph, VertexType};
use crate::pipeline::{ExtractionRecord, RunContext};

const CATEGORY_ORDER: [(&str, &[VertexType]); 5] = [
    (
        "Threats",
        &[
            VertexType::HumanThreatMalicious,
            VertexType::HumanThreatNonMalicious,
            VertexType::NonHumanThreat,
        ],
    ),
    ("Threat scenarios", &[VertexType::ThreatScenario]),
    ("Unwanted incidents", &[VertexType::UnwantedIncident]),
    ("Assets", &[VertexType::Asset]),
    ("Mitigations", &[VertexType::Mitigation]),
];

pub fn render_markdown(run: &RunContext) -> String {
    let mut lines = vec![
        format!("# CORAS threat model report `{}`", run.run_id),
        String::new(),
        format!("- Created: {}", run.created_at),
        format!("- Updated: {}", run.updated_at),
        format!(
            "- Completed stages: {}",
            if run.completed_stages.is_empty() {
                "none".to_string()
            } else {
                run.completed_stages
                    .iter()
                    .map(|stage| stage.as_str())
                    .collect::<Vec<&str>>()
                    .join(", ")
            }
        ),
    ];
    if let (Some(stage), Some(reason)) = (run.failed_stage, run.failure_reason.as_deref()) {
        lines.push(format!("- Failed stage: {stage} ({reason})"));
    }

    push_section(&mut lines, "System description", run.description.as_deref());
    push_section(&mut lines, "Summary", run.summary.as_deref());
    push_section(&mut lines, "Retrieved context", run.context.as_deref());
    push_section(&mut lines, "Risk analysis", run.analysis.as_deref());

    lines.push(String::new());
    lines.push("## Threat model".to_string());
    lines.push(String::new());
    match &run.extraction {
        None => lines.push("_Not produced._".to_string()),
        Some(ExtractionRecord::Failed { failure }) => {
            lines.push(format!(
                "Graph extraction failed (`{}`): {failure}",
                failure.state()
            ));
        }
        Some(ExtractionRecord::Valid { graph, advisories }) => {
            push_graph(&mut lines, graph);
            if !advisories.is_empty() {
                lines.push(String::new());
                lines.push("### Advisories".to_string());
                lines.push(String::new());
                lines.extend(advisories.iter().map(|advisory| format!("- {advisory}")));
            }
        }
    }

    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered
}

fn push_section(lines: &mut Vec<String>, title: &str, body: Option<&str>) {
    lines.push(String::new());
    lines.push(format!("## {title}"));
    lines.push(String::new());
    match body.map(str::trim) {
        Some(body) if !body.is_empty() => lines.push(body.to_string()),
        _ => lines.push("_Not produced._".to_string()),
    }
}

fn push_graph(lines: &mut Vec<String>, graph: &ThreatGraph) {
    for (title, kinds) in CATEGORY_ORDER {
        let members = graph
            .vertices
            .iter()
            .filter(|vertex| kinds.contains(&vertex.kind))
            .collect::<Vec<_>>();
        if members.is_empty() {
            continue;
        }

        lines.push(format!("### {title}"));
        lines.push(String::new());
        for vertex in members {
            if kinds.len() > 1 {
                lines.push(format!(
                    "- **{}** {} _({})_",
                    vertex.id,
                    vertex.text,
                    vertex.kind.label()
                ));
            } else {
                lines.push(format!("- **{}** {}", vertex.id, vertex.text));
            }
        }
        lines.push(String::new());
    }

    lines.push("### Relations".to_string());
    lines.push(String::new());
    if graph.edges.is_empty() {
        lines.push("_No relations._".to_string());
        return;
    }

    lines.push("| Source | Target | Vulnerabilities |".to_string());
    lines.push("| --- | --- | --- |".to_string());
    for edge in &graph.edges {
        let vulnerabilities = if edge.vulnerabilities.is_empty() {
            "-".to_string()
        } else {
            edge.vulnerabilities.join(", ")
        };
        lines.push(format!(
            "| {} | {} | {} |",
            table_cell(&describe_endpoint(graph, &edge.source)),
            table_cell(&describe_endpoint(graph, &edge.target)),
            table_cell(&vulnerabilities)
        ));
    }
}

fn table_cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn describe_endpoint(graph: &ThreatGraph, id: &str) -> String {
    match graph.vertex(id) {
        Some(vertex) => format!("{} ({})", id, vertex.kind.label()),
        None => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, ExtractionFailure, Vertex};
    use crate::pipeline::Stage;

    fn vertex(id: &str, kind: VertexType, text: &str) -> Vertex {
        Vertex {
            id: id.to_string(),
            kind,
            text: text.to_string(),
        }
    }

    fn edge(source: &str, target: &str, vulnerabilities: &[&str]) -> Edge {
        Edge {
            source: source.to_string(),
            target: target.to_string(),
            vulnerabilities: vulnerabilities.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn graph_sections_follow_coras_order() {
        let mut run = RunContext::new();
        run.description = Some("Wearable with Bluetooth link".to_string());
        run.record_success(Stage::Summarize);
        run.extraction = Some(ExtractionRecord::Valid {
            graph: ThreatGraph {
                vertices: vec![
                    vertex("M1", VertexType::Mitigation, "Encrypt link"),
                    vertex("A1", VertexType::Asset, "patient vitals data"),
                    vertex("U1", VertexType::UnwantedIncident, "Vitals disclosed"),
                    vertex("S1", VertexType::ThreatScenario, "Eavesdropping"),
                    vertex("T1", VertexType::HumanThreatMalicious, "Attacker"),
                ],
                edges: vec![
                    edge("T1", "S1", &["CWE-319"]),
                    edge("S1", "U1", &[]),
                    edge("U1", "A1", &[]),
                    edge("M1", "S1", &[]),
                ],
            },
            advisories: Vec::new(),
        });

        let report = render_markdown(&run);
        let positions = [
            "### Threats",
            "### Threat scenarios",
            "### Unwanted incidents",
            "### Assets",
            "### Mitigations",
            "### Relations",
        ]
        .map(|heading| report.find(heading).expect(heading));
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));

        assert!(report.contains("- **T1** Attacker _(Human threat (malicious))_"));
        assert!(report.contains("| T1 (Human threat (malicious)) | S1 (Threat scenario) | CWE-319 |"));
        assert!(report.contains("- Completed stages: summarize"));
        assert!(report.contains("## Risk analysis\n\n_Not produced._"));
    }

    #[test]
    fn pipes_in_relation_cells_are_escaped() {
        let mut run = RunContext::new();
        run.extraction = Some(ExtractionRecord::Valid {
            graph: ThreatGraph {
                vertices: vec![
                    vertex("S|1", VertexType::ThreatScenario, "Eavesdropping"),
                    vertex("U1", VertexType::UnwantedIncident, "Vitals disclosed"),
                ],
                edges: vec![edge("S|1", "U1", &["CWE-319|CWE-311"])],
            },
            advisories: Vec::new(),
        });

        let report = render_markdown(&run);
        assert!(report.contains(
            "| S\\|1 (Threat scenario) | U1 (Unwanted incident) | CWE-319\\|CWE-311 |"
        ));
    }

    #[test]
    fn failed_extraction_is_reported_explicitly() {
        let mut run = RunContext::new();
        run.extraction = Some(ExtractionRecord::Failed {
            failure: ExtractionFailure::NoCandidate,
        });
        run.record_failure(Stage::Extract, "no JSON object found in generated text");

        let report = render_markdown(&run);
        assert!(report.contains("Graph extraction failed (`no_candidate`)"));
        assert!(report.contains("- Failed stage: extract"));
    }
}
