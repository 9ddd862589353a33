//! Collaborators outside the browser page: egress location, browser launch and
//! the VPN region switch.

pub mod browser;
pub mod geo;
pub mod vpn;

use std::env;
use std::path::{Path, PathBuf};

use crate::core::control::RunControl;
use crate::core::worker::EventSink;
use crate::error::AutomationResult;

/// Public egress address and its country.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgressInfo {
    pub ip: String,
    /// ISO 3166 alpha-2, upper case.
    pub country_code: String,
}

/// Reports where traffic currently leaves the machine. `None` means unknown.
pub trait EgressProbe: Send {
    fn egress(&self) -> Option<EgressInfo>;
}

pub trait BrowserLauncher: Send {
    /// Open `url`; `false` when no browser could be started.
    fn open(&self, url: &str) -> bool;
}

/// Moves the egress location to the target region and back.
pub trait RegionSwitcher: Send {
    /// Connect and verify. `Ok(false)` is a failed switch; only a stop is an `Err`.
    fn connect(&mut self, control: &RunControl, events: &EventSink) -> AutomationResult<bool>;

    fn disconnect(&mut self, events: &EventSink) -> bool;
}

/// Resolve an executable: an existing path as given, then `PATH`, then the
/// usual install folders on Windows.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let direct = Path::new(name);
    if direct.components().count() > 1 && direct.is_file() {
        return Some(direct.to_path_buf());
    }

    if let Some(paths) = env::var_os("PATH") {
        for dir in env::split_paths(&paths) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    known_install_locations(name)
        .into_iter()
        .find(|candidate| candidate.is_file())
}

fn known_install_locations(name: &str) -> Vec<PathBuf> {
    if !cfg!(windows) {
        return Vec::new();
    }
    let program_files = env::var_os("ProgramFiles")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\Program Files"));
    let program_files_x86 = env::var_os("ProgramFiles(x86)")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\Program Files (x86)"));
    let local_app_data = env::var_os("LOCALAPPDATA").map(PathBuf::from);

    match name.to_ascii_lowercase().as_str() {
        "nordvpn.exe" => vec![
            program_files.join("NordVPN").join("nordvpn.exe"),
            program_files_x86.join("NordVPN").join("nordvpn.exe"),
        ],
        "chrome.exe" => vec![
            program_files.join(r"Google\Chrome\Application\chrome.exe"),
            program_files_x86.join(r"Google\Chrome\Application\chrome.exe"),
        ],
        "opera.exe" | "launcher.exe" => {
            let mut paths = Vec::new();
            if let Some(local) = &local_app_data {
                paths.push(local.join(r"Programs\Opera\launcher.exe"));
                paths.push(local.join(r"Programs\Opera GX Browser\launcher.exe"));
            }
            paths.push(program_files.join(r"Opera\launcher.exe"));
            paths.push(program_files.join(r"Opera GX Browser\launcher.exe"));
            paths.push(program_files.join(r"Opera\opera.exe"));
            paths.push(program_files_x86.join(r"Opera\launcher.exe"));
            paths.push(program_files_x86.join(r"Opera\opera.exe"));
            paths
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_path_is_used_as_given() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("fake-browser");
        std::fs::write(&exe, b"").unwrap();
        assert_eq!(find_executable(exe.to_str().unwrap()), Some(exe));
    }

    #[test]
    fn test_unknown_executable_is_none() {
        assert_eq!(find_executable("definitely-not-installed-4f1c2b.exe"), None);
    }
}
