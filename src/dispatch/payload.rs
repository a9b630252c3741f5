use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ExecutionError;

/// A call to a registered job function
///
/// This is what travels in the `job` field of `/submit_job`. The scheduler
/// stores it as opaque bytes; only a dispatch backend decodes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub job_id: String,
    pub function: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl JobPayload {
    pub fn new(job_id: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            function: function.into(),
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn arguments(&self) -> Arguments<'_> {
        Arguments {
            args: &self.args,
            kwargs: &self.kwargs,
        }
    }
}

/// Typed access to a payload's positional and keyword arguments
#[derive(Debug, Clone, Copy)]
pub struct Arguments<'a> {
    args: &'a [Value],
    kwargs: &'a Map<String, Value>,
}

impl<'a> Arguments<'a> {
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn positional(&self) -> &'a [Value] {
        self.args
    }

    /// Decode positional argument `index`
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, ExecutionError> {
        let value = self
            .args
            .get(index)
            .ok_or(ExecutionError::MissingArgument(index))?;

        T::deserialize(value).map_err(|source| ExecutionError::InvalidArgument {
            name: index.to_string(),
            source,
        })
    }

    /// Decode keyword argument `name`, if it was passed
    pub fn kwarg<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ExecutionError> {
        self.kwargs
            .get(name)
            .map(|value| {
                T::deserialize(value).map_err(|source| ExecutionError::InvalidArgument {
                    name: name.to_string(),
                    source,
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_positional_and_keyword_arguments() {
        let mut payload = JobPayload::new("j", "f").with_args(vec![json!(3), json!("x")]);
        payload.kwargs.insert("scale".into(), json!(2.5));

        let args = payload.arguments();
        assert_eq!(args.len(), 2);
        assert_eq!(args.get::<i64>(0).unwrap(), 3);
        assert_eq!(args.get::<String>(1).unwrap(), "x");
        assert_eq!(args.kwarg::<f64>("scale").unwrap(), Some(2.5));
        assert_eq!(args.kwarg::<f64>("offset").unwrap(), None);
    }

    #[test]
    fn reports_missing_and_mistyped_arguments() {
        let payload = JobPayload::new("j", "f").with_args(vec![json!("three")]);
        let args = payload.arguments();

        assert!(matches!(
            args.get::<i64>(1),
            Err(ExecutionError::MissingArgument(1))
        ));
        assert!(matches!(
            args.get::<i64>(0),
            Err(ExecutionError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn payload_without_arguments_decodes() {
        let payload = JobPayload::from_bytes(br#"{"job_id": "a", "function": "noop"}"#).unwrap();
        assert!(payload.args.is_empty());
        assert!(payload.kwargs.is_empty());
    }
}
