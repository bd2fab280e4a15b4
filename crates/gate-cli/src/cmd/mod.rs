pub mod config;
pub mod ledger;
pub mod policy;
pub mod serve;
pub mod submit;
pub mod validate;

use anyhow::Context;
use gate_core::config::GateConfig;
use gate_core::params::{parse_command_line, ParsedLine};
use gate_core::types::Severity;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn load_config(path: &Path) -> anyhow::Result<GateConfig> {
    GateConfig::load(path).with_context(|| format!("failed to load {}", path.display()))
}

/// Parse a CLI command line; blank lines and comments are an error here.
pub(crate) fn parse_line(line: &str) -> anyhow::Result<ParsedLine> {
    parse_command_line(line)?.ok_or_else(|| anyhow::anyhow!("no command in '{line}'"))
}

/// GET `url` and decode the JSON reply. A non-2xx reply is an error carrying
/// the server's `error` message.
pub(crate) fn get_json<T: DeserializeOwned>(url: &str) -> anyhow::Result<T> {
    let (status, text) = match ureq::get(url).timeout(READ_TIMEOUT).call() {
        Ok(resp) => (resp.status(), resp.into_string()?),
        Err(ureq::Error::Status(code, resp)) => (code, resp.into_string()?),
        Err(e) => return Err(anyhow::anyhow!("request to {url} failed: {e}")),
    };
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(text);
        anyhow::bail!("HTTP {status}: {message}");
    }
    serde_json::from_str(&text).with_context(|| format!("unexpected reply from {url}"))
}

pub(crate) fn parse_severity(raw: Option<&str>) -> anyhow::Result<Option<Severity>> {
    raw.map(str::parse::<Severity>).transpose().map_err(Into::into)
}
