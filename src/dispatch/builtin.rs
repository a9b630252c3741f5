use std::time::Duration;

use serde_json::{Number, Value};

use super::{Arguments, ExecutionError, JobRegistry};

/// Functions every worker binary can run out of the box
pub fn registry() -> JobRegistry {
    JobRegistry::new()
        .with("echo", echo)
        .with("add", add)
        .with("sleep_ms", sleep_ms)
}

/// Returns its single argument, or all arguments as a list
fn echo(args: Arguments<'_>) -> Result<Value, ExecutionError> {
    match args.positional() {
        [single] => Ok(single.clone()),
        many => Ok(Value::Array(many.to_vec())),
    }
}

/// Sums numeric arguments, staying in integers when every argument is one
fn add(args: Arguments<'_>) -> Result<Value, ExecutionError> {
    let values = args.positional();
    if let Some(ints) = values.iter().map(Value::as_i64).collect::<Option<Vec<i64>>>() {
        return ints
            .into_iter()
            .try_fold(0i64, i64::checked_add)
            .map(Value::from)
            .ok_or_else(|| ExecutionError::raised("OverflowError: integer sum overflowed"));
    }

    let mut total = 0.0;
    for (index, value) in values.iter().enumerate() {
        total += value.as_f64().ok_or_else(|| {
            ExecutionError::raised(format!("TypeError: argument {} is not a number", index))
        })?;
    }
    Number::from_f64(total)
        .map(Value::Number)
        .ok_or_else(|| ExecutionError::raised("ValueError: sum is not finite"))
}

/// Blocks the execution slot for the given number of milliseconds
fn sleep_ms(args: Arguments<'_>) -> Result<u64, ExecutionError> {
    let ms: u64 = args.get(0)?;
    std::thread::sleep(Duration::from_millis(ms));
    Ok(ms)
}
