//! Single request command
//!
//! Sends one request through the pipeline and prints the attempts and body.

use crate::error::{CliError, CliResult};
use colored::Colorize;
use sluice_config::Settings;
use sluice_transport::{AttemptOutcome, Method, RequestPipeline, RequestSpec, ResponseEnvelope};

/// Build the request from command line pieces.
pub fn build(method: &str, path: &str, body: Option<&str>, retryable: bool) -> CliResult<RequestSpec> {
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidArgument(format!("unknown method '{}'", method)))?;

    let request = RequestSpec::new(method, path).retryable(retryable);
    match body {
        Some(body) => {
            let value: serde_json::Value = serde_json::from_str(body)
                .map_err(|e| CliError::InvalidArgument(format!("body is not JSON: {}", e)))?;
            request
                .json(&value)
                .map_err(|e| CliError::InvalidArgument(e.to_string()))
        }
        None => Ok(request),
    }
}

/// Request command
pub async fn run(
    settings: &Settings,
    method: &str,
    path: &str,
    body: Option<&str>,
    retryable: bool,
    quiet: bool,
) -> CliResult<()> {
    let request = build(method, path, body, retryable)?;
    let pipeline = RequestPipeline::http(settings.transport_config()?)?;

    let response = pipeline.execute(request).await;
    if !quiet {
        print_attempts(&response);
    }
    if !response.is_valid() {
        return Err(CliError::Request(response.debug_information()));
    }

    match response.json::<serde_json::Value>() {
        Ok(value) => println!(
            "{}",
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| response.text())
        ),
        Err(_) => println!("{}", response.text()),
    }
    Ok(())
}

fn print_attempts(response: &ResponseEnvelope) {
    for (i, attempt) in response.attempts().iter().enumerate() {
        let status = attempt
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "---".to_string());
        let marker = match attempt.outcome {
            AttemptOutcome::Success => "✓".green(),
            AttemptOutcome::BadResponse => "✗".yellow(),
            AttemptOutcome::RetryableStatus | AttemptOutcome::TransportError => "✗".red(),
        };
        eprintln!(
            "  {} #{} {} {} {:?}{}",
            marker,
            i + 1,
            attempt.node,
            status,
            attempt.latency,
            attempt
                .error
                .as_ref()
                .map(|e| format!(" ({})", e))
                .unwrap_or_default()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request() {
        let request = build("get", "_cluster/health", None, true).unwrap();
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.path(), "/_cluster/health");
        assert!(request.is_retryable());

        let request = build("POST", "/logs/_search", Some(r#"{"size":0}"#), false).unwrap();
        assert_eq!(request.method(), &Method::POST);
        assert!(!request.is_retryable());
        assert_eq!(&request.body_bytes().unwrap()[..], br#"{"size":0}"#);
    }

    #[test]
    fn test_build_rejects_bad_input() {
        assert!(matches!(
            build("GET", "/", Some("{not json"), true),
            Err(CliError::InvalidArgument(_))
        ));
        assert!(matches!(
            build("GE T", "/", None, true),
            Err(CliError::InvalidArgument(_))
        ));
    }
}
