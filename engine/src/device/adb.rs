//! ADB device backend
//!
//! Performs actions on an Android device through `adb`: `input` for touches
//! and keys, `monkey` to launch apps, `am start` for deep links and
//! `exec-out screencap` for observations. Every adb invocation is bounded by
//! the configured action timeout.
//!
//! Deep links use two-tier dispatch: the intent is first scoped to the target
//! package, and if that fails it is sent again unscoped so any handler on the
//! device can take it.

use async_trait::async_trait;
use regex::Regex;
use sdk::{Action, ActionDispatcher, ActionError, KeyCode, Observation, MAX_WAIT_MS};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::skills::AppScanner;

/// Hold duration used to turn a swipe into a long press
const LONG_PRESS_MS: u32 = 800;

/// Screenshots kept on disk: the Evaluator compares the latest two
const RETAINED_SCREENSHOTS: usize = 2;

static FOCUS_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Thin async wrapper over the adb binary
#[derive(Debug, Clone)]
pub struct Adb {
    path: String,
    serial: Option<String>,
    timeout: Duration,
}

impl Adb {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            path: config.adb_path.clone(),
            serial: config.serial.clone(),
            timeout: Duration::from_secs(config.action_timeout_secs),
        }
    }

    /// Run adb with `args` and return stdout
    pub async fn run(&self, args: &[String]) -> Result<Vec<u8>, ActionError> {
        let mut command = Command::new(&self.path);
        if let Some(serial) = &self.serial {
            command.arg("-s").arg(serial);
        }
        command.args(args).kill_on_drop(true);

        debug!("adb {}", args.join(" "));

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => return Err(ActionError::Timeout),
            Ok(Err(e)) => {
                return Err(ActionError::Backend(format!(
                    "failed to execute {}: {}",
                    self.path, e
                )))
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        // `am start` reports failures on stdout with a zero exit status
        if let Some(error) = classify_failure(&stdout, &stderr) {
            return Err(error);
        }
        if !output.status.success() {
            return Err(ActionError::Backend(format!(
                "adb exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }

    /// First line of `adb version`
    pub async fn version(&self) -> Result<String, ActionError> {
        let out = self.run(&["version".to_string()]).await?;
        Ok(String::from_utf8_lossy(&out)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string())
    }
}

fn classify_failure(stdout: &str, stderr: &str) -> Option<ActionError> {
    let combined = format!("{}\n{}", stdout, stderr);
    let lower = combined.to_lowercase();

    if lower.contains("securityexception") || lower.contains("permission denial") {
        return Some(ActionError::PermissionDenied(first_error_line(&combined)));
    }
    if lower.contains("activity not started")
        || lower.contains("unable to resolve intent")
        || lower.contains("no activities found")
        || lower.contains("activity class")
    {
        return Some(ActionError::TargetNotFound(first_error_line(&combined)));
    }
    if lower.contains("no devices/emulators found") || lower.contains("device offline") {
        return Some(ActionError::Backend(first_error_line(&combined)));
    }
    None
}

fn first_error_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| l.to_lowercase().contains("error") || l.contains("Exception"))
        .or_else(|| text.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("unknown adb failure")
        .to_string()
}

/// Quote a value for the device-side shell that `adb shell` hands it to
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// `input text` needs spaces as `%s`; the rest is protected by quoting
fn input_text(text: &str) -> String {
    shell_quote(&text.replace(' ', "%s"))
}

fn keycode(key: KeyCode) -> &'static str {
    match key {
        KeyCode::Back => "KEYCODE_BACK",
        KeyCode::Home => "KEYCODE_HOME",
        KeyCode::Enter => "KEYCODE_ENTER",
        KeyCode::AppSwitch => "KEYCODE_APP_SWITCH",
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// adb arguments for an action; `None` for actions that need no device call.
///
/// `scoped` only affects deep links: when false the package is left out.
pub fn command_for(action: &Action, scoped: bool) -> Option<Vec<String>> {
    let command = match action {
        Action::Tap { x, y } => args(&["shell", "input", "tap", &x.to_string(), &y.to_string()]),
        Action::LongPress { x, y } => {
            let (x, y) = (x.to_string(), y.to_string());
            args(&[
                "shell",
                "input",
                "swipe",
                &x,
                &y,
                &x,
                &y,
                &LONG_PRESS_MS.to_string(),
            ])
        }
        Action::Swipe {
            x1,
            y1,
            x2,
            y2,
            duration_ms,
        } => args(&[
            "shell",
            "input",
            "swipe",
            &x1.to_string(),
            &y1.to_string(),
            &x2.to_string(),
            &y2.to_string(),
            &duration_ms.to_string(),
        ]),
        Action::Type { text } => args(&["shell", "input", "text", &input_text(text)]),
        Action::PressKey { key } => args(&["shell", "input", "keyevent", keycode(*key)]),
        Action::OpenApp { package } => args(&[
            "shell",
            "monkey",
            "-p",
            package,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ]),
        Action::DeepLink { uri, package } => {
            let mut command = args(&[
                "shell",
                "am",
                "start",
                "-W",
                "-a",
                "android.intent.action.VIEW",
                "-d",
                &shell_quote(uri),
            ]);
            if scoped {
                if let Some(package) = package {
                    command.push(package.clone());
                }
            }
            command
        }
        Action::Wait { .. } => return None,
    };
    Some(command)
}

/// Package of the focused window in `dumpsys window` output
pub fn parse_focused_package(dumpsys: &str) -> Option<String> {
    let pattern = FOCUS_PATTERN.get_or_init(|| {
        Regex::new(r"mCurrentFocus=.*\s([A-Za-z0-9_.]+)/").expect("Invalid focus pattern")
    });
    dumpsys
        .lines()
        .find_map(|line| pattern.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Packages from `pm list packages` output
pub fn parse_package_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

pub struct AdbDispatcher {
    adb: Adb,
    screenshot_dir: PathBuf,
    settle: Duration,
    screenshots: Mutex<VecDeque<PathBuf>>,
}

impl AdbDispatcher {
    pub fn new(config: &DeviceConfig, screenshot_dir: PathBuf) -> Self {
        Self {
            adb: Adb::from_config(config),
            screenshot_dir,
            settle: Duration::from_millis(config.settle_ms),
            screenshots: Mutex::new(VecDeque::new()),
        }
    }

    pub fn adb(&self) -> &Adb {
        &self.adb
    }

    async fn dispatch_deep_link(&self, action: &Action) -> Result<(), ActionError> {
        let Action::DeepLink { uri, package } = action else {
            return Err(ActionError::Backend("not a deep link".into()));
        };

        if package.is_some() {
            if let Some(scoped) = command_for(action, true) {
                match self.adb.run(&scoped).await {
                    Ok(_) => return Ok(()),
                    Err(ActionError::Timeout) => return Err(ActionError::Timeout),
                    Err(e) => warn!("Scoped deep link {} failed ({}), retrying unscoped", uri, e),
                }
            }
        }

        if let Some(unscoped) = command_for(action, false) {
            self.adb.run(&unscoped).await?;
        }
        Ok(())
    }

    async fn capture(&self) -> Result<Option<PathBuf>, ActionError> {
        tokio::fs::create_dir_all(&self.screenshot_dir)
            .await
            .map_err(|e| ActionError::Backend(format!("screenshot dir: {}", e)))?;

        let png = self.adb.run(&args(&["exec-out", "screencap", "-p"])).await?;
        if png.is_empty() {
            return Ok(None);
        }

        let path = self
            .screenshot_dir
            .join(format!("{}.png", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, png)
            .await
            .map_err(|e| ActionError::Backend(format!("writing {}: {}", path.display(), e)))?;
        self.retain(path.clone()).await;
        Ok(Some(path))
    }

    /// Track a new capture and delete the ones no role can still look at
    async fn retain(&self, path: PathBuf) {
        let expired: Vec<PathBuf> = {
            let mut recent = self
                .screenshots
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            recent.push_back(path);
            let excess = recent.len().saturating_sub(RETAINED_SCREENSHOTS);
            recent.drain(..excess).collect()
        };

        for old in expired {
            if let Err(e) = tokio::fs::remove_file(&old).await {
                debug!("Could not remove {}: {}", old.display(), e);
            }
        }
    }
}

#[async_trait]
impl ActionDispatcher for AdbDispatcher {
    fn name(&self) -> &str {
        "adb"
    }

    async fn observe(&self) -> Result<Observation, ActionError> {
        let mut observation = Observation::new(uuid::Uuid::new_v4().to_string());

        if let Some(path) = self.capture().await? {
            observation = observation.with_screenshot(path);
        }

        match self.adb.run(&args(&["shell", "dumpsys", "window"])).await {
            Ok(out) => {
                if let Some(package) = parse_focused_package(&String::from_utf8_lossy(&out)) {
                    observation = observation.with_foreground_app(package);
                }
            }
            Err(e) => debug!("Could not read focused window: {}", e),
        }

        Ok(observation)
    }

    async fn execute(&self, action: &Action) -> Result<Observation, ActionError> {
        info!("Dispatching {}", action);
        match action {
            Action::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis((*ms).min(MAX_WAIT_MS))).await
            }
            Action::DeepLink { .. } => self.dispatch_deep_link(action).await?,
            other => {
                if let Some(command) = command_for(other, true) {
                    self.adb.run(&command).await?;
                }
            }
        }

        tokio::time::sleep(self.settle).await;
        self.observe().await
    }
}

/// Installed-package scanner backed by `pm list packages`
pub struct AdbAppScanner {
    adb: Adb,
}

impl AdbAppScanner {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            adb: Adb::from_config(config),
        }
    }
}

#[async_trait]
impl AppScanner for AdbAppScanner {
    async fn scan(&self) -> Result<Vec<String>, ActionError> {
        let out = self
            .adb
            .run(&args(&["shell", "pm", "list", "packages"]))
            .await?;
        Ok(parse_package_list(&String::from_utf8_lossy(&out)))
    }
}
