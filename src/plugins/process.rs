//! Out-of-process script engine
//!
//! Every invocation writes a small harness around the plugin code to a
//! temporary file and runs it with an external interpreter. The argument
//! list goes in on stdin, a single JSON envelope comes back on stdout.
//! The harness keeps stdout to itself: once it holds a private handle, any
//! output of the code, through `console` or `process.stdout`, lands on
//! stderr and is logged at debug level.
//!
//! The code runs as the body of an async function taking `Plugin`, so it
//! may use top-level `await` and declare its own `Plugin`.

use std::io::{ErrorKind, Write as _};
use std::process::Stdio;

use log::debug;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::engine::{Invocation, ScriptEngine, ScriptError};

/// Reads the invocation and takes stdout away from the code
const PRELUDE: &str = r#"const __boxforge_input = JSON.parse(require('fs').readFileSync(0, 'utf8'));
const __boxforge_write = process.stdout.write.bind(process.stdout);
const __boxforge_emit = (envelope) => __boxforge_write(JSON.stringify(envelope));
const __boxforge_done = Symbol('boxforge');
process.stdout.write = process.stderr.write.bind(process.stderr);
globalThis.console = new (require('console').Console)(process.stderr, process.stderr);
"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Envelope {
    Ok(Value),
    Error(String),
    Missing(String),
}

#[derive(Debug, Clone)]
pub struct ProcessEngine {
    interpreter: String,
    args: Vec<String>,
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self::new("node", Vec::new())
    }
}

impl ProcessEngine {
    pub fn new(interpreter: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            args,
        }
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }
}

/// Builds the script the interpreter runs for one invocation
pub fn harness(code: &str, handler: &str) -> Result<String, ScriptError> {
    if !is_identifier(handler) {
        return Err(ScriptError::InvalidHandler(handler.to_string()));
    }
    // the inner block lets the code shadow the `Plugin` parameter
    Ok(format!(
        r#"{PRELUDE}
(async (Plugin, __boxforge_args) => {{ {{
{code}
;
if (typeof {handler} !== 'function') return {{ [__boxforge_done]: true, missing: true }};
return {{ [__boxforge_done]: true, ok: await {handler}(...__boxforge_args) }};
}} }})(__boxforge_input.plugin, __boxforge_input.args).then(
  (result) => {{
    if (!result || !result[__boxforge_done] || result.missing) {{
      __boxforge_emit({{ missing: '{handler}' }});
    }} else {{
      __boxforge_emit({{ ok: result.ok === undefined ? null : result.ok }});
    }}
  }},
  (error) => __boxforge_emit({{ error: String((error && error.message) || error) }}),
);
"#
    ))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// First `SomeError: message` line of the interpreter's stderr
fn error_line(stderr: &str) -> Option<&str> {
    stderr.lines().map(str::trim).find(|line| {
        let Some((name, _)) = line.split_once(": ") else {
            return false;
        };
        // `Error [ERR_CODE]: message`
        let name = name.split_once(" [").map_or(name, |(name, _)| name);
        name.ends_with("Error") && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Interprets the interpreter's stdout
fn parse_envelope(stdout: &[u8], stderr: &[u8]) -> Result<Value, ScriptError> {
    let text = String::from_utf8_lossy(stdout);
    match serde_json::from_str::<Envelope>(text.trim()) {
        Ok(Envelope::Ok(value)) => Ok(value),
        Ok(Envelope::Error(message)) => Err(ScriptError::Raised(message)),
        Ok(Envelope::Missing(handler)) => Err(ScriptError::MissingHandler(handler)),
        Err(_) => {
            // The harness never ran to completion, most likely a syntax error
            let stderr = String::from_utf8_lossy(stderr);
            let reason = match error_line(&stderr) {
                Some(line) => line,
                None if stderr.trim().is_empty() => "no output",
                None => stderr.trim(),
            };
            Err(ScriptError::InvalidOutput(reason.to_string()))
        }
    }
}

impl ScriptEngine for ProcessEngine {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<Value, ScriptError> {
        let script = harness(invocation.code, invocation.handler)?;
        let mut file = tempfile::Builder::new()
            .prefix("boxforge-")
            .suffix(".js")
            .tempfile()?;
        file.write_all(script.as_bytes())?;
        file.flush()?;

        let input = json!({
            "plugin": invocation.plugin,
            "args": invocation.args,
        });

        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&self.args)
            .arg(file.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            "Running {} of [{}] with {}",
            invocation.handler, invocation.name, self.interpreter
        );
        let mut child = cmd.spawn().map_err(|source| ScriptError::Spawn {
            interpreter: self.interpreter.clone(),
            source,
        })?;

        // fed concurrently, a child failing early may never read it all
        let stdin = child.stdin.take();
        let payload = input.to_string();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(payload.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        match fed {
            Err(e) if e.kind() != ErrorKind::BrokenPipe => return Err(e.into()),
            _ => {}
        }

        if !output.stderr.is_empty() {
            debug!(
                "[{}] {}",
                invocation.name,
                String::from_utf8_lossy(&output.stderr).trim_end()
            );
        }
        parse_envelope(&output.stdout, &output.stderr)
    }
}
