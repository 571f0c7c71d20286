//! System clipboard access through the platform's command-line tools.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Clipboard tool family, chosen once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// `wl-paste` / `wl-copy`
    Wayland,
    /// `xclip -selection clipboard`
    Xclip,
    /// `xsel --clipboard`
    Xsel,
    /// `pbpaste` / `pbcopy`
    MacOs,
    /// PowerShell `Get-Clipboard`, writing through `clip.exe` when present
    Windows { clip_exe: bool },
}

impl Backend {
    /// Probe `PATH` for a usable clipboard tool.
    pub fn detect() -> Result<Self> {
        Self::probe(|name| find_in_path(name).is_some())
    }

    /// Pick the first backend whose tools `available` reports present.
    pub fn probe(available: impl Fn(&str) -> bool) -> Result<Self> {
        if available("wl-paste") && available("wl-copy") {
            return Ok(Self::Wayland);
        }
        if available("xclip") {
            return Ok(Self::Xclip);
        }
        if available("xsel") {
            return Ok(Self::Xsel);
        }
        if available("pbpaste") && available("pbcopy") {
            return Ok(Self::MacOs);
        }
        if available("powershell") || available("powershell.exe") {
            return Ok(Self::Windows {
                clip_exe: available("clip.exe"),
            });
        }
        bail!("no clipboard tool found (install wl-clipboard, xclip or xsel)")
    }

    /// Current clipboard text.
    pub async fn read_text(&self) -> Result<String> {
        let (program, args) = self.read_command();
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {program}"))?;
        if !output.status.success() {
            bail!("{program} exited with {}", output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Replace the clipboard contents with `text`.
    pub async fn write_text(&self, text: &str) -> Result<()> {
        let (program, args) = self.write_command();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to run {program}"))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            // EOF tells the tool the content is complete
            drop(stdin);
        }
        let status = child.wait().await?;
        if !status.success() {
            bail!("{program} exited with {status}");
        }
        Ok(())
    }

    fn read_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Self::Wayland => ("wl-paste", &["-n"]),
            Self::Xclip => ("xclip", &["-selection", "clipboard", "-o"]),
            Self::Xsel => ("xsel", &["--clipboard", "--output"]),
            Self::MacOs => ("pbpaste", &[]),
            Self::Windows { .. } => (
                "powershell",
                &["-NoProfile", "-Command", "Get-Clipboard -Raw"],
            ),
        }
    }

    fn write_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Self::Wayland => ("wl-copy", &[]),
            Self::Xclip => ("xclip", &["-selection", "clipboard"]),
            Self::Xsel => ("xsel", &["--clipboard", "--input"]),
            Self::MacOs => ("pbcopy", &[]),
            Self::Windows { clip_exe: true } => ("clip.exe", &[]),
            Self::Windows { clip_exe: false } => (
                "powershell",
                &["-NoProfile", "-Command", "$input | Set-Clipboard"],
            ),
        }
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
