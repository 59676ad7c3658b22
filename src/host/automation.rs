use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

use super::{HostPlatform, WindowRef};
use crate::utils::platform::{check_automation_availability, is_binary_available};

/// Start the host detached from our stdio and reap it in the background
async fn spawn_detached(executable: &Path, document: Option<&Path>) -> Result<u32> {
    let mut command = Command::new(executable);
    if let Some(document) = document {
        command.arg(document);
    }

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to start {}", executable.display()))?;

    let pid = child
        .id()
        .context("Host process exited before its pid could be read")?;

    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => debug!(pid, %status, "host process exited"),
            Err(e) => debug!(pid, error = %e, "failed to wait on host process"),
        }
    });

    Ok(pid)
}

/// Run `<executable> -r <script>`, the host's command-line script runner
async fn run_with_script_flag(executable: &Path, script: &Path) -> Result<String> {
    let output = Command::new(executable)
        .arg("-r")
        .arg(script)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("Failed to run script through {}", executable.display()))?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Script runner exited with {}: {}", output.status, error.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// pgrep pattern matching processes whose command starts with the executable's file name
fn process_pattern(executable: &Path) -> String {
    let name = executable
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| executable.to_string_lossy().to_string());
    format!(r"(^|[/\\]){}($|\s)", regex::escape(&name))
}

/// First pid in pgrep output
fn parse_pgrep(stdout: &str) -> Option<u32> {
    stdout.lines().find_map(|line| line.trim().parse().ok())
}

async fn pgrep(executable: &Path) -> Result<Option<u32>> {
    let output = Command::new("pgrep")
        .arg("-f")
        .arg(process_pattern(executable))
        .output()
        .await
        .context("Failed to execute pgrep")?;

    // pgrep exits with 1 when nothing matched
    if !output.status.success() {
        return Ok(None);
    }
    Ok(parse_pgrep(&String::from_utf8_lossy(&output.stdout)))
}

/// Liveness through `ps`; zombies count as gone
async fn ps_alive(pid: u32) -> Result<bool> {
    let pid = pid.to_string();
    let output = Command::new("ps")
        .args(["-o", "stat=", "-p", pid.as_str()])
        .output()
        .await
        .context("Failed to execute ps")?;

    if !output.status.success() {
        return Ok(false);
    }
    let stat = String::from_utf8_lossy(&output.stdout);
    let stat = stat.trim();
    Ok(!stat.is_empty() && !stat.starts_with('Z'))
}

fn title_matches(title: &str, hint: &str) -> bool {
    hint.is_empty() || title.to_lowercase().contains(&hint.to_lowercase())
}

/// macOS automation using pgrep and AppleScript
pub struct MacOSAutomation;

impl MacOSAutomation {
    fn is_available(&self) -> bool {
        cfg!(target_os = "macos") && is_binary_available("osascript")
    }

    /// Application name for `tell application`, taken from the enclosing .app bundle
    fn application_name(executable: &Path) -> String {
        executable
            .ancestors()
            .find(|p| p.extension().map(|e| e == "app").unwrap_or(false))
            .unwrap_or(executable)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    async fn osascript(&self, script: &str) -> Result<String> {
        let output = Command::new("osascript")
            .arg("-e")
            .arg(script)
            .output()
            .await
            .context("Failed to execute AppleScript")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("AppleScript execution failed: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl HostPlatform for MacOSAutomation {
    fn description(&self) -> &'static str {
        "macOS AppleScript automation"
    }

    async fn find_process(&self, executable: &Path) -> Result<Option<u32>> {
        pgrep(executable).await
    }

    async fn is_alive(&self, pid: u32) -> Result<bool> {
        ps_alive(pid).await
    }

    async fn spawn(&self, executable: &Path, document: Option<&Path>) -> Result<u32> {
        spawn_detached(executable, document).await
    }

    async fn find_main_window(&self, pid: u32, _title_hint: &str) -> Result<Option<WindowRef>> {
        // Document windows on macOS carry the project name, not the
        // application name, so any window of the process counts.
        let apple_script = format!(
            r#"
            tell application "System Events"
                set matches to (every process whose unix id is {pid})
                if (count of matches) is 0 then return ""
                set target to item 1 of matches
                if (count of windows of target) is 0 then return ""
                return "window:" & (name of window 1 of target)
            end tell
            "#
        );

        let output = self.osascript(&apple_script).await?;
        Ok(output.strip_prefix("window:").map(|title| WindowRef {
            id: format!("{pid}:1"),
            title: title.to_string(),
        }))
    }

    async fn run_script(&self, executable: &Path, _pid: u32, script: &Path) -> Result<String> {
        let application = Self::application_name(executable);
        let apple_script = format!(
            r#"tell application "{}" to DoScriptFile "{}""#,
            application.replace('"', "\\\""),
            script.to_string_lossy().replace('"', "\\\"")
        );
        self.osascript(&apple_script).await
    }
}

/// Windows automation using tasklist and PowerShell
pub struct WindowsAutomation;

impl WindowsAutomation {
    fn is_available(&self) -> bool {
        cfg!(target_os = "windows") && is_binary_available("powershell")
    }

    /// Pid column of `tasklist /FO CSV /NH` output
    fn parse_tasklist(stdout: &str) -> Option<u32> {
        stdout.lines().find_map(|line| {
            let mut fields = line.trim().trim_matches('"').split("\",\"");
            fields.next()?;
            fields.next()?.parse().ok()
        })
    }

    async fn tasklist(&self, filter: &str) -> Result<Option<u32>> {
        let output = Command::new("tasklist")
            .args(["/FO", "CSV", "/NH", "/FI", filter])
            .output()
            .await
            .context("Failed to execute tasklist")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tasklist failed: {}", error.trim());
        }
        Ok(Self::parse_tasklist(&String::from_utf8_lossy(&output.stdout)))
    }

    /// `handle|title` lines printed by the window lookup script
    fn parse_window(stdout: &str, title_hint: &str) -> Option<WindowRef> {
        stdout.lines().find_map(|line| {
            let (handle, title) = line.trim().split_once('|')?;
            if handle.is_empty() || handle == "0" || !title_matches(title, title_hint) {
                return None;
            }
            Some(WindowRef {
                id: handle.to_string(),
                title: title.to_string(),
            })
        })
    }
}

#[async_trait]
impl HostPlatform for WindowsAutomation {
    fn description(&self) -> &'static str {
        "Windows PowerShell automation"
    }

    async fn find_process(&self, executable: &Path) -> Result<Option<u32>> {
        let image = executable
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .context("Host executable path has no file name")?;
        self.tasklist(&format!("IMAGENAME eq {image}")).await
    }

    async fn is_alive(&self, pid: u32) -> Result<bool> {
        Ok(self.tasklist(&format!("PID eq {pid}")).await? == Some(pid))
    }

    async fn spawn(&self, executable: &Path, document: Option<&Path>) -> Result<u32> {
        spawn_detached(executable, document).await
    }

    async fn find_main_window(&self, pid: u32, title_hint: &str) -> Result<Option<WindowRef>> {
        let powershell_script = format!(
            r#"
            $p = Get-Process -Id {pid} -ErrorAction SilentlyContinue
            if ($p -and $p.MainWindowHandle -ne 0) {{
                Write-Output ("{{0}}|{{1}}" -f $p.MainWindowHandle, $p.MainWindowTitle)
            }}
            "#
        );

        let output = Command::new("powershell")
            .args(["-NoProfile", "-Command", &powershell_script])
            .output()
            .await
            .context("Failed to execute PowerShell script")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("PowerShell execution failed: {}", error.trim());
        }

        Ok(Self::parse_window(&String::from_utf8_lossy(&output.stdout), title_hint))
    }

    async fn run_script(&self, executable: &Path, _pid: u32, script: &Path) -> Result<String> {
        run_with_script_flag(executable, script).await
    }
}

/// Linux automation using pgrep and xdotool
pub struct LinuxAutomation;

impl LinuxAutomation {
    fn is_available(&self) -> bool {
        cfg!(target_os = "linux") && is_binary_available("xdotool") && is_binary_available("pgrep")
    }

    async fn xdotool(&self, args: &[&str]) -> Result<Option<String>> {
        let output = Command::new("xdotool")
            .args(args)
            .output()
            .await
            .context("Failed to execute xdotool")?;

        // xdotool exits non-zero when a search finds nothing
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }
}

#[async_trait]
impl HostPlatform for LinuxAutomation {
    fn description(&self) -> &'static str {
        "Linux xdotool automation"
    }

    async fn find_process(&self, executable: &Path) -> Result<Option<u32>> {
        pgrep(executable).await
    }

    async fn is_alive(&self, pid: u32) -> Result<bool> {
        ps_alive(pid).await
    }

    async fn spawn(&self, executable: &Path, document: Option<&Path>) -> Result<u32> {
        spawn_detached(executable, document).await
    }

    async fn find_main_window(&self, pid: u32, title_hint: &str) -> Result<Option<WindowRef>> {
        let pid = pid.to_string();
        let Some(ids) = self
            .xdotool(&["search", "--onlyvisible", "--pid", pid.as_str()])
            .await?
        else {
            return Ok(None);
        };

        for id in ids.lines().map(str::trim).filter(|id| !id.is_empty()) {
            let title = self
                .xdotool(&["getwindowname", id])
                .await?
                .unwrap_or_default();
            if title_matches(&title, title_hint) {
                return Ok(Some(WindowRef {
                    id: id.to_string(),
                    title,
                }));
            }
        }

        Ok(None)
    }

    async fn run_script(&self, executable: &Path, _pid: u32, script: &Path) -> Result<String> {
        run_with_script_flag(executable, script).await
    }
}

/// Stand-in used when no automation tool is installed.
///
/// Project and template operations keep working; anything that needs the
/// host fails with the install hint.
pub struct UnsupportedPlatform {
    reason: String,
}

impl UnsupportedPlatform {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl HostPlatform for UnsupportedPlatform {
    fn description(&self) -> &'static str {
        "unavailable"
    }

    async fn find_process(&self, _executable: &Path) -> Result<Option<u32>> {
        anyhow::bail!("{}", self.reason)
    }

    async fn is_alive(&self, _pid: u32) -> Result<bool> {
        anyhow::bail!("{}", self.reason)
    }

    async fn spawn(&self, _executable: &Path, _document: Option<&Path>) -> Result<u32> {
        anyhow::bail!("{}", self.reason)
    }

    async fn find_main_window(&self, _pid: u32, _title_hint: &str) -> Result<Option<WindowRef>> {
        anyhow::bail!("{}", self.reason)
    }

    async fn run_script(&self, _executable: &Path, _pid: u32, _script: &Path) -> Result<String> {
        anyhow::bail!("{}", self.reason)
    }
}

/// Get the automation implementation for the current platform, if its tools are installed
pub fn get_platform_automation() -> Option<Arc<dyn HostPlatform>> {
    if cfg!(target_os = "macos") {
        let automation = MacOSAutomation;
        if automation.is_available() {
            return Some(Arc::new(automation));
        }
    } else if cfg!(target_os = "windows") {
        let automation = WindowsAutomation;
        if automation.is_available() {
            return Some(Arc::new(automation));
        }
    } else if cfg!(target_os = "linux") {
        let automation = LinuxAutomation;
        if automation.is_available() {
            return Some(Arc::new(automation));
        }
    }

    None
}

/// Platform automation, or a stand-in that reports why none is available
pub fn get_host_platform() -> Arc<dyn HostPlatform> {
    get_platform_automation().unwrap_or_else(|| {
        let availability = check_automation_availability();
        let reason = format!(
            "Host automation is not available on {} ({} not found). {}",
            availability.platform.display_name(),
            availability.tool_name,
            availability.install_hint.unwrap_or_default()
        );
        Arc::new(UnsupportedPlatform::new(reason.trim_end()))
    })
}
