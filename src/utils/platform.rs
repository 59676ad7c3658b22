use std::process::Command;

/// Supported operating system platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
    Unknown,
}

impl Platform {
    /// Detect the current platform
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOS
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Unknown
        }
    }

    /// Get the display name for the platform
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::MacOS => "macOS",
            Platform::Linux => "Linux",
            Platform::Windows => "Windows",
            Platform::Unknown => "Unknown",
        }
    }

    /// Tool the platform uses to look up processes and windows
    pub fn automation_tool(&self) -> &'static str {
        match self {
            Platform::MacOS => "osascript",
            Platform::Linux => "xdotool",
            Platform::Windows => "powershell",
            Platform::Unknown => "none",
        }
    }
}

/// Check if a binary is available in PATH
pub fn is_binary_available(binary_name: &str) -> bool {
    let (finder, arg) = if cfg!(target_os = "windows") {
        ("where", binary_name)
    } else {
        ("which", binary_name)
    };

    Command::new(finder)
        .arg(arg)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Information about automation tool availability
#[derive(Debug, Clone)]
pub struct AutomationAvailability {
    pub platform: Platform,
    pub tool_name: &'static str,
    pub is_available: bool,
    pub install_hint: Option<&'static str>,
}

/// Check if the process/window automation tool for this platform is present
pub fn check_automation_availability() -> AutomationAvailability {
    let platform = Platform::current();
    let tool_name = platform.automation_tool();

    let (is_available, missing_hint) = match platform {
        Platform::MacOS => (
            is_binary_available(tool_name),
            "osascript should be available by default on macOS",
        ),
        Platform::Linux => (
            is_binary_available(tool_name) && is_binary_available("pgrep"),
            "Install xdotool and procps: sudo apt-get install xdotool procps (Debian/Ubuntu) or equivalent",
        ),
        Platform::Windows => (
            is_binary_available(tool_name),
            "PowerShell should be available by default on Windows",
        ),
        Platform::Unknown => (false, "Platform not supported for automation"),
    };

    AutomationAvailability {
        platform,
        tool_name,
        is_available,
        install_hint: if is_available {
            None
        } else {
            Some(missing_hint)
        },
    }
}
