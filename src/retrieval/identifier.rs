use regex::Regex;

use crate::error::{NavigatorError, NavigatorResult};

#[derive(Debug, Clone)]
pub struct IdentifierParser {
    pattern: Regex,
}

impl IdentifierParser {
    pub fn new(pattern: &str) -> NavigatorResult<Self> {
        let pattern = Regex::new(pattern).map_err(|err| {
            NavigatorError::configuration(format!("invalid identifier pattern '{pattern}': {err}"))
        })?;
        if pattern.captures_len() < 2 {
            return Err(NavigatorError::configuration(format!(
                "identifier pattern '{}' must capture the identifier in a group",
                pattern.as_str()
            )));
        }
        Ok(Self { pattern })
    }

    pub fn parse<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.pattern
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|found| found.as_str())
    }
}
