use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::{Arguments, ExecutionError, JobPayload};

type JobFn = dyn Fn(Arguments<'_>) -> Result<Value, ExecutionError> + Send + Sync;

/// Named job functions a worker is able to run
///
/// Functions must be registered under the same name on every worker that
/// may receive a call to them; an unknown name fails the job.
#[derive(Clone, Default)]
pub struct JobRegistry {
    functions: HashMap<String, Arc<JobFn>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` under `name`, replacing any earlier registration
    pub fn register<F, R>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(Arguments<'_>) -> Result<R, ExecutionError> + Send + Sync + 'static,
        R: Serialize,
    {
        let wrapped = move |args: Arguments<'_>| -> Result<Value, ExecutionError> {
            let output = function(args)?;
            serde_json::to_value(output).map_err(ExecutionError::Serialize)
        };
        self.functions.insert(name.into(), Arc::new(wrapped));
        self
    }

    /// Builder form of [`JobRegistry::register`]
    pub fn with<F, R>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(Arguments<'_>) -> Result<R, ExecutionError> + Send + Sync + 'static,
        R: Serialize,
    {
        self.register(name, function);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run the function a payload names with the payload's arguments
    pub fn invoke(&self, payload: &JobPayload) -> Result<Value, ExecutionError> {
        let function = self
            .functions
            .get(&payload.function)
            .ok_or_else(|| ExecutionError::UnknownFunction(payload.function.clone()))?;

        function(payload.arguments())
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> JobRegistry {
        JobRegistry::new()
            .with("add_one", |args| Ok(args.get::<i64>(0)? + 1))
            .with("raise", |_| -> Result<(), _> {
                Err(ExecutionError::raised("ValueError: boom"))
            })
    }

    #[test]
    fn invokes_registered_function() {
        let payload = JobPayload::new("j", "add_one").with_args(vec![json!(3)]);
        assert_eq!(registry().invoke(&payload).unwrap(), json!(4));
    }

    #[test]
    fn unknown_function_fails() {
        let payload = JobPayload::new("j", "missing");
        let err = registry().invoke(&payload).unwrap_err();
        assert_eq!(err.to_string(), "unknown function: missing");
    }

    #[test]
    fn raised_error_keeps_its_message() {
        let payload = JobPayload::new("j", "raise");
        let err = registry().invoke(&payload).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn names_are_sorted() {
        assert_eq!(registry().names(), vec!["add_one", "raise"]);
    }
}
