use serde_json::{Value, json};

pub(super) const SUMMARIZER_SYSTEM: &str = "You restructure an informal description of a system into a clear, \
complete technical description: components, data handled, interfaces and communication channels, users and \
operating environment. Answer with the description only, without any introduction.";

pub(super) const ASSESSOR_SYSTEM: &str = "You are a cybersecurity risk analyst. Using the system description \
between ### markers and the reference material between <context> tags, identify at least two distinct risks \
covering different attack surfaces and threat kinds (accidental human, deliberate human, non-human). For each \
risk give the threat, one or more consecutive threat scenarios, the unwanted incident and the impacted assets. \
For every threat scenario list the related weaknesses as CWE identifiers and possible mitigations, and state \
whether each weakness comes from the reference material.";

pub(super) const FORMATTER_SYSTEM: &str = "You convert a textual risk analysis into one JSON object with two \
arrays, \"vertices\" and \"edges\". Each vertex has \"id\", \"type\" and \"text\". Allowed types: \
human_threat_non_malicious, human_threat_malicious, non_human_threat, threat_scenario, unwanted_incident, \
asset, mitigation. Each edge has \"source\", \"target\" and \"vulnerabilities\" (a list of CWE identifiers, \
possibly empty). Rules: threats initiate threat scenarios; a threat scenario leads to another threat scenario \
or to an unwanted incident; every unwanted incident impacts at least one asset; mitigations only connect to \
threat scenarios; a vulnerability identifier is attached to exactly one edge. Include every risk of the \
analysis.";

pub(super) const JUDGE_SYSTEM: &str = "You decide which reference entries relate to a given system context. \
Return the most relevant entries, copied verbatim with all of their details (description, weaknesses, \
mitigations), and nothing else.";

pub(super) fn summarizer_prompt(description: &str) -> String {
    format!("System description:\n{description}\n\nStructured description:")
}

pub(super) fn assessor_prompt(description: &str, context: &str) -> String {
    format!("Analyze the following system:\n###\n{description}\n###\n<context>\n{context}\n</context>")
}

pub(super) fn formatter_prompt(analysis: &str) -> String {
    format!(
        "Format every risk of the following analysis as the JSON object described above, keeping all listed \
vulnerabilities on edges.\n<risks>\n{analysis}\n</risks>"
    )
}

pub(super) fn judge_prompt(query: &str, entries: &str, top_n: usize) -> String {
    format!(
        "Return the {top_n} entries that relate best to the context.\n<context>\n{query}\n</context>\n\nEntries:\n###\n{entries}\n###"
    )
}

pub(super) const FEW_SHOT_INPUT: &str = "Risk 1: Firmware tampering through the maintenance port
- Threat: Malicious technician with physical access
- Threat scenarios:
  1. The technician connects to the unauthenticated maintenance port (CWE-306).
  2. The technician flashes modified firmware onto the infusion pump (CWE-494).
- Unwanted incident: Pump delivers an incorrect dosage
- Impacted assets: Patient safety
- Mitigations: Require signed firmware images";

pub(super) fn few_shot_output() -> String {
    json!({
        "vertices": [
            { "id": "R1-T", "type": "human_threat_malicious", "text": "Malicious technician with physical access" },
            { "id": "R1-TS1", "type": "threat_scenario", "text": "The technician connects to the unauthenticated maintenance port" },
            { "id": "R1-TS2", "type": "threat_scenario", "text": "The technician flashes modified firmware onto the infusion pump" },
            { "id": "R1-UI", "type": "unwanted_incident", "text": "Pump delivers an incorrect dosage" },
            { "id": "patient_safety", "type": "asset", "text": "Patient safety" },
            { "id": "R1-M1", "type": "mitigation", "text": "Require signed firmware images" }
        ],
        "edges": [
            { "source": "R1-T", "target": "R1-TS1", "vulnerabilities": [] },
            { "source": "R1-TS1", "target": "R1-TS2", "vulnerabilities": ["CWE-306"] },
            { "source": "R1-TS2", "target": "R1-UI", "vulnerabilities": ["CWE-494"] },
            { "source": "R1-UI", "target": "patient_safety", "vulnerabilities": [] },
            { "source": "R1-M1", "target": "R1-TS2", "vulnerabilities": [] }
        ]
    })
    .to_string()
}

pub(super) fn graph_json_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "vertices": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "type": {
                            "type": "string",
                            "enum": [
                                "human_threat_non_malicious",
                                "human_threat_malicious",
                                "non_human_threat",
                                "threat_scenario",
                                "unwanted_incident",
                                "asset",
                                "mitigation"
                            ]
                        },
                        "text": { "type": "string" }
                    },
                    "required": ["id", "type", "text"]
                }
            },
            "edges": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "source": { "type": "string" },
                        "target": { "type": "string" },
                        "vulnerabilities": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["source", "target"]
                }
            }
        },
        "required": ["vertices", "edges"]
    })
}
