//! Playwright browser sessions
//!
//! A session is a long-lived `node` process running a small driver script.
//! Commands and replies are exchanged as one JSON object per line over the
//! child's stdin/stdout:
//!
//! ```text
//! -> {"op":"navigate","url":"https://...","waitUntil":"networkidle"}
//! <- {"ok":true,"url":"https://.../callback?code=..."}
//! -> {"op":"close"}
//! <- {"ok":true,"closed":true}
//! ```
//!
//! The browser is launched lazily on the first navigation, so modules that
//! never need a redirect never start Chromium.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use conformance_common::WaitUntil;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::{RunnerError, RunnerResult};

/// A browser owned by a single module execution
#[async_trait]
pub trait BrowserSession: Send {
    /// Open `url`, wait for `wait_until`, and return the final URL after redirects
    async fn navigate(&mut self, url: &str, wait_until: WaitUntil) -> RunnerResult<String>;

    /// Release the browser; safe to call on a session that never navigated
    async fn close(&mut self);
}

/// Factory for per-module browser sessions
pub trait BrowserLauncher: Send + Sync {
    fn launch(&self) -> Box<dyn BrowserSession>;
}

/// Configuration for Playwright sessions
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub headless: bool,
    /// Node executable
    pub node_binary: String,
    /// Directory `playwright` is resolved from; defaults to the process cwd
    pub working_dir: Option<PathBuf>,
    pub ignore_https_errors: bool,
    /// Upper bound for a single navigation, enforced in the driver and here
    pub navigation_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            headless: true,
            node_binary: "node".to_string(),
            working_dir: None,
            ignore_https_errors: true,
            navigation_timeout: Duration::from_secs(60),
        }
    }
}

impl PlaywrightConfig {
    /// Build the driver script run by `node -e`
    pub fn driver_script(&self) -> String {
        format!(
            r#"
const {{ chromium }} = require('playwright');
const readline = require('readline');

const send = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');
const describe = (e) => String((e && e.message) || e);

(async () => {{
  let browser;
  try {{
    browser = await chromium.launch({{ headless: {headless} }});
  }} catch (e) {{
    send({{ ok: false, error: describe(e) }});
    process.exit(1);
  }}
  const context = await browser.newContext({{ ignoreHTTPSErrors: {ignore_https} }});
  const page = await context.newPage();
  send({{ ok: true, ready: true }});

  const rl = readline.createInterface({{ input: process.stdin }});
  for await (const line of rl) {{
    if (!line.trim()) continue;
    let cmd;
    try {{
      cmd = JSON.parse(line);
    }} catch (e) {{
      send({{ ok: false, error: 'invalid command: ' + describe(e) }});
      continue;
    }}
    if (cmd.op === 'navigate') {{
      try {{
        await page.goto(cmd.url, {{ waitUntil: cmd.waitUntil, timeout: {timeout_ms} }});
        send({{ ok: true, url: page.url() }});
      }} catch (e) {{
        send({{ ok: false, error: describe(e) }});
      }}
    }} else if (cmd.op === 'close') {{
      await context.close().catch(() => {{}});
      await browser.close().catch(() => {{}});
      send({{ ok: true, closed: true }});
      break;
    }} else {{
      send({{ ok: false, error: 'unknown op: ' + cmd.op }});
    }}
  }}
  process.exit(0);
}})();
"#,
            headless = self.headless,
            ignore_https = self.ignore_https_errors,
            timeout_ms = self.navigation_timeout.as_millis(),
        )
    }
}

/// Launches [`PlaywrightSession`]s sharing one configuration
#[derive(Debug, Clone, Default)]
pub struct PlaywrightLauncher {
    config: PlaywrightConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }
}

impl BrowserLauncher for PlaywrightLauncher {
    fn launch(&self) -> Box<dyn BrowserSession> {
        Box::new(PlaywrightSession::new(self.config.clone()))
    }
}

/// Reply line from the driver
#[derive(Debug, Default, Deserialize, PartialEq)]
struct DriverReply {
    #[serde(default)]
    ok: bool,
    url: Option<String>,
    error: Option<String>,
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    closed: bool,
}

fn parse_reply(line: &str) -> RunnerResult<DriverReply> {
    serde_json::from_str(line.trim())
        .map_err(|e| RunnerError::Browser(format!("malformed driver reply '{}': {}", line.trim(), e)))
}

struct DriverProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl DriverProcess {
    async fn send(&mut self, command: serde_json::Value) -> RunnerResult<()> {
        let mut line = command.to_string();
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| RunnerError::Browser(format!("driver stdin closed: {}", e)))?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> RunnerResult<DriverReply> {
        let line = tokio::time::timeout(timeout, self.stdout.next_line())
            .await
            .map_err(|_| RunnerError::Browser(format!("no reply from driver within {:?}", timeout)))??;
        match line {
            Some(line) => parse_reply(&line),
            None => Err(RunnerError::Browser("driver exited unexpectedly".to_string())),
        }
    }
}

/// Browser session backed by a Playwright driver process
pub struct PlaywrightSession {
    config: PlaywrightConfig,
    process: Option<DriverProcess>,
}

impl PlaywrightSession {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self {
            config,
            process: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.process.is_some()
    }

    /// Slack on top of the navigation timeout for process and IPC overhead
    fn reply_timeout(&self) -> Duration {
        self.config.navigation_timeout + Duration::from_secs(10)
    }

    async fn initialize(&mut self) -> RunnerResult<&mut DriverProcess> {
        if self.process.is_none() {
            let process = self.spawn().await?;
            self.process = Some(process);
        }
        self.process
            .as_mut()
            .ok_or_else(|| RunnerError::Browser("browser not initialized".to_string()))
    }

    async fn spawn(&self) -> RunnerResult<DriverProcess> {
        info!(
            "Launching Chromium (headless: {})",
            self.config.headless
        );

        let mut command = Command::new(&self.config.node_binary);
        command
            .arg("-e")
            .arg(self.config.driver_script())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            RunnerError::Browser(format!(
                "failed to start '{}': {}",
                self.config.node_binary, e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RunnerError::Browser("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Browser("driver stdout unavailable".to_string()))?;

        let mut process = DriverProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };

        let ready = process.recv(self.reply_timeout()).await?;
        if !ready.ok || !ready.ready {
            let _ = process.child.kill().await;
            return Err(RunnerError::Browser(
                ready
                    .error
                    .unwrap_or_else(|| "browser failed to start".to_string()),
            ));
        }
        Ok(process)
    }
}

#[async_trait]
impl BrowserSession for PlaywrightSession {
    async fn navigate(&mut self, url: &str, wait_until: WaitUntil) -> RunnerResult<String> {
        let timeout = self.reply_timeout();
        let process = self.initialize().await?;

        debug!("Navigating to {} (waitUntil: {})", url, wait_until);
        process
            .send(json!({"op": "navigate", "url": url, "waitUntil": wait_until.as_str()}))
            .await?;

        let reply = process.recv(timeout).await?;
        if !reply.ok {
            return Err(RunnerError::Browser(format!(
                "navigation to {} failed: {}",
                url,
                reply.error.unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        reply
            .url
            .ok_or_else(|| RunnerError::Browser("navigation reply carried no URL".to_string()))
    }

    async fn close(&mut self) {
        let Some(mut process) = self.process.take() else {
            return;
        };

        let closed = match process.send(json!({"op": "close"})).await {
            Ok(()) => process
                .recv(Duration::from_secs(10))
                .await
                .map(|reply| reply.closed)
                .unwrap_or(false),
            Err(_) => false,
        };

        if closed {
            let _ = tokio::time::timeout(Duration::from_secs(5), process.child.wait()).await;
        } else {
            warn!("Browser driver did not close cleanly, killing it");
        }
        let _ = process.child.kill().await;
        debug!("Browser session closed");
    }
}
