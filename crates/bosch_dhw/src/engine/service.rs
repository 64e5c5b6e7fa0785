use serde::Serialize;

/// Shape of the data a registered service accepts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceSchema {
    /// Keys that must be present in the call data
    pub required: Vec<String>,
}

impl ServiceSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    /// Return the first required field missing from `data`.
    pub fn missing_field<'a>(&'a self, data: &serde_json::Value) -> Option<&'a str> {
        self.required
            .iter()
            .find(|field| data.get(field.as_str()).is_none())
            .map(String::as_str)
    }
}

/// A service registered by an integration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub domain: String,
    pub service: String,
    pub schema: ServiceSchema,
    pub integration_name: String,
}
