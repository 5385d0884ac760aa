use std::collections::BTreeMap;
use std::fs;

use tracing::info;

use crate::corpus::{DocumentDescriptor, DocumentFormat};
use crate::error::{NavigatorError, NavigatorResult};

#[derive(Debug, Clone, Default)]
pub struct DetailTable {
    records: BTreeMap<String, String>,
}

impl DetailTable {
    #[cfg(test)]
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            records: entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn load(descriptor: &DocumentDescriptor) -> NavigatorResult<Self> {
        if descriptor.format != DocumentFormat::Json {
            return Err(NavigatorError::configuration(format!(
                "detail table must be a json document, got '{}': {}",
                descriptor.format,
                descriptor.path.display()
            )));
        }

        let raw = fs::read(&descriptor.path).map_err(|err| {
            NavigatorError::configuration(format!(
                "failed to read detail table {}: {err}",
                descriptor.path.display()
            ))
        })?;
        let records: BTreeMap<String, String> = serde_json::from_slice(&raw).map_err(|err| {
            NavigatorError::configuration(format!(
                "detail table {} is not an object of identifier to record strings: {err}",
                descriptor.path.display()
            ))
        })?;

        info!(
            path = %descriptor.path.display(),
            records = records.len(),
            "detail table loaded"
        );

        Ok(Self { records })
    }

    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.records.get(identifier).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_identifier_to_record_object() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("capec-detailed.json");
        fs::write(
            &path,
            r#"{"12": "CAPEC-12 detail...", "651": "CAPEC-651 Eavesdropping"}"#,
        )
        .expect("write detail table");

        let table =
            DetailTable::load(&DocumentDescriptor::new(&path, DocumentFormat::Json)).expect("load");
        assert_eq!(table.get("651"), Some("CAPEC-651 Eavesdropping"));
        assert_eq!(table.get("12"), Some("CAPEC-12 detail..."));
        assert_eq!(table.get("13"), None);
    }

    #[test]
    fn non_json_descriptor_is_configuration_error() {
        let err = DetailTable::load(&DocumentDescriptor::new("details.txt", DocumentFormat::Txt))
            .expect_err("txt detail table");
        assert!(matches!(err, NavigatorError::Configuration(_)));
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = DetailTable::load(&DocumentDescriptor::new(
            dir.path().join("absent.json"),
            DocumentFormat::Json,
        ))
        .expect_err("missing file");
        assert!(matches!(err, NavigatorError::Configuration(_)));
    }

    #[test]
    fn non_string_records_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("details.json");
        fs::write(&path, r#"{"12": {"name": "nested"}}"#).expect("write");

        let err = DetailTable::load(&DocumentDescriptor::new(&path, DocumentFormat::Json))
            .expect_err("nested record");
        assert!(matches!(err, NavigatorError::Configuration(_)));
    }
}
