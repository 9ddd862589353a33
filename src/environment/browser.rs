use std::process::{Command, Stdio};

use crate::environment::{find_executable, BrowserLauncher};

/// Opens the target page in a preferred browser, else with the system default.
pub struct SystemBrowser {
    preferred: Vec<String>,
}

impl SystemBrowser {
    pub fn new(preferred: Vec<String>) -> Self {
        Self { preferred }
    }

    fn launch_preferred(&self, url: &str) -> bool {
        for name in &self.preferred {
            let Some(path) = find_executable(name) else {
                tracing::debug!(browser = %name, "browser not installed");
                continue;
            };
            match Command::new(&path)
                .arg(url)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
            {
                Ok(_) => {
                    tracing::info!(browser = %path.display(), "browser started");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(browser = %path.display(), error = %e, "browser failed to start");
                }
            }
        }
        false
    }
}

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> bool {
        if self.launch_preferred(url) {
            return true;
        }

        let (program, args) = default_opener(url);
        tracing::info!(opener = program, "falling back to the default browser");
        match Command::new(program)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(opener = program, error = %e, "default browser could not be opened");
                false
            }
        }
    }
}

/// Platform command that opens `url` in the default browser.
pub fn default_opener(url: &str) -> (&'static str, Vec<String>) {
    if cfg!(windows) {
        // The empty string is the window title `start` expects first
        ("cmd", vec!["/C".into(), "start".into(), String::new(), url.to_string()])
    } else if cfg!(target_os = "macos") {
        ("open", vec![url.to_string()])
    } else {
        ("xdg-open", vec![url.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_opener_passes_url_last() {
        let url = "https://labs.google/fx/tools/whisk";
        let (program, args) = default_opener(url);
        assert!(!program.is_empty());
        assert_eq!(args.last().map(String::as_str), Some(url));
    }
}
