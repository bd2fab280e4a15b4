use anyhow::Context;
use gate_core::signing::{self, SIGNATURE_HEADER};
use gate_core::types::Command;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use super::{load_config, parse_line, parse_severity};
use crate::output::print_json;

/// Judges and the bridge each have their own timeouts; this only bounds a
/// stuck connection.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub fn run(
    config: &Path,
    line: &str,
    server: &str,
    action_id: Option<String>,
    severity: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let cfg = load_config(config)?;
    let parsed = parse_line(line)?;
    let severity = parse_severity(severity)?;
    let action_id = action_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let command = Command::new(action_id, parsed.command_type, parsed.params, severity);
    let body = serde_json::to_vec(&command)?;

    let url = format!("{}/v1/actions", server.trim_end_matches('/'));
    let mut request = ureq::post(&url)
        .timeout(REQUEST_TIMEOUT)
        .set("content-type", "application/json");
    if let Some(name) = &cfg.signing.key_secret {
        let key = cfg
            .secret(name)
            .with_context(|| format!("signing.key_secret '{name}' not found"))?;
        request = request.set(SIGNATURE_HEADER, &signing::sign(key.as_bytes(), &body));
    }

    let (status, text) = match request.send_bytes(&body) {
        Ok(resp) => (resp.status(), resp.into_string()?),
        Err(ureq::Error::Status(code, resp)) => (code, resp.into_string()?),
        Err(e) => return Err(anyhow::anyhow!("request to {url} failed: {e}")),
    };
    let reply: Value = serde_json::from_str(&text)
        .with_context(|| format!("server returned non-JSON (HTTP {status}): {text}"))?;

    if let Some(err) = reply.get("error").and_then(Value::as_str) {
        anyhow::bail!("HTTP {status}: {err}");
    }

    if json {
        print_json(&reply)?;
    } else {
        let field = |k: &str| reply.get(k).and_then(Value::as_str).unwrap_or("-");
        println!("action:   {}", field("action_id"));
        println!("status:   {}", field("status"));
        println!("severity: {}", field("severity"));
        if let Some(kind) = reply.get("failure").and_then(Value::as_str) {
            println!("failure:  {kind}");
        }
        println!("reason:   {}", field("rationale"));
        if let Some(result) = reply.get("tool_result") {
            println!("result:   {result}");
        }
    }

    if !(200..300).contains(&status) {
        anyhow::bail!("action failed (HTTP {status})");
    }
    Ok(())
}
