use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::wait::{Wait, DEFAULT_POLL_INTERVAL};
use super::{ClientError, JobConnection, SchedulerClient};
use crate::dispatch::JobPayload;

/// One argument of a job call: a plain value or the future result of an
/// earlier job
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Job(JobConnection),
}

impl Arg {
    /// Serialize any value into an argument
    pub fn value<T: Serialize>(value: &T) -> Result<Self, ClientError> {
        Ok(Arg::Value(serde_json::to_value(value)?))
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<JobConnection> for Arg {
    fn from(job: JobConnection) -> Self {
        Arg::Job(job)
    }
}

impl From<&JobConnection> for Arg {
    fn from(job: &JobConnection) -> Self {
        Arg::Job(job.clone())
    }
}

macro_rules! arg_from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Value(Value::from(value))
                }
            }
        )*
    };
}

arg_from_scalar!(i32, i64, u32, u64, f64, bool, String, &str);

/// A call to a named job function, built up argument by argument
#[derive(Debug, Clone)]
pub struct Call {
    function: String,
    args: Vec<Arg>,
    kwargs: Vec<(String, Arg)>,
}

impl Call {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: Vec::new(),
            kwargs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, arg: impl Into<Arg>) -> Self {
        self.kwargs.push((name.into(), arg.into()));
        self
    }

    pub fn function(&self) -> &str {
        &self.function
    }
}

/// Submits calls to a scheduler and hands back [`JobConnection`]s
///
/// Arguments that are themselves unfinished jobs are waited on before the
/// call is submitted, so a job never reaches the scheduler before all of
/// its inputs have resolved.
#[derive(Debug, Clone)]
pub struct Client {
    scheduler: SchedulerClient,
    poll_interval: Duration,
}

impl Client {
    pub fn new(address: &str) -> Result<Self, ClientError> {
        Ok(Self {
            scheduler: SchedulerClient::new(address)?,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn scheduler(&self) -> &SchedulerClient {
        &self.scheduler
    }

    /// Reattach to a job submitted earlier
    pub fn connect(&self, job_id: impl Into<String>) -> JobConnection {
        JobConnection::new(job_id, self.scheduler.clone())
    }

    pub async fn submit(&self, call: Call) -> Result<JobConnection, ClientError> {
        let Call {
            function,
            args,
            kwargs,
        } = call;

        let args = args.wait_every(self.poll_interval).await?;
        let mut resolved_kwargs = Map::new();
        for (name, arg) in kwargs {
            resolved_kwargs.insert(name, arg.wait_every(self.poll_interval).await?);
        }

        let payload = JobPayload {
            job_id: Uuid::new_v4().to_string(),
            function,
            args,
            kwargs: resolved_kwargs,
        };
        let job_id = self
            .scheduler
            .submit_job(Some(&payload.job_id), payload.to_bytes()?)
            .await?;

        debug!("Submitted {} as job {}", payload.function, job_id);
        Ok(self.connect(job_id))
    }

    /// Submit one call of `function` per input, preserving input order
    pub async fn map<I, A>(&self, function: &str, inputs: I) -> Result<Vec<JobConnection>, ClientError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        let mut jobs = Vec::new();
        for input in inputs {
            jobs.push(self.submit(Call::new(function).arg(input)).await?);
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_collects_arguments_in_order() {
        let call = Call::new("scale")
            .arg(2)
            .arg("metres")
            .kwarg("factor", 1.5);

        assert_eq!(call.function(), "scale");
        assert!(matches!(&call.args[0], Arg::Value(v) if *v == json!(2)));
        assert!(matches!(&call.args[1], Arg::Value(v) if *v == json!("metres")));
        assert_eq!(call.kwargs[0].0, "factor");
    }

    #[test]
    fn serializable_values_become_arguments() {
        #[derive(Serialize)]
        struct Point {
            x: i32,
            y: i32,
        }

        let arg = Arg::value(&Point { x: 1, y: 2 }).unwrap();
        assert!(matches!(arg, Arg::Value(v) if v == json!({"x": 1, "y": 2})));
    }
}
