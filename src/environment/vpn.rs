use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::automation::context::secs_to_duration;
use crate::core::control::RunControl;
use crate::core::worker::EventSink;
use crate::environment::{find_executable, EgressInfo, EgressProbe, RegionSwitcher};
use crate::error::AutomationResult;
use crate::settings::RegionSettings;

const COMMAND_POLL: Duration = Duration::from_millis(200);

/// How a CLI invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Exited(Option<i32>),
    TimedOut,
    SpawnFailed(String),
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, CommandOutcome::Exited(Some(0)))
    }
}

/// Run `command` to completion or until `timeout`, checkpointing while waiting.
/// A timed out or stopped child is killed.
pub fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
    control: &RunControl,
) -> AutomationResult<CommandOutcome> {
    let mut child = match command.stdout(Stdio::null()).stderr(Stdio::null()).spawn() {
        Ok(child) => child,
        Err(e) => return Ok(CommandOutcome::SpawnFailed(e.to_string())),
    };

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(CommandOutcome::Exited(status.code())),
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                return Ok(CommandOutcome::SpawnFailed(e.to_string()));
            }
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(CommandOutcome::TimedOut);
        }
        if let Err(e) = control.pause_for(COMMAND_POLL) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
    }
}

/// Poll the egress location until it reports `target_country`.
///
/// Waits `interval` before each of `retries` attempts. When the country already
/// matches but the address did not change although the run started outside the
/// target country, the lookup is considered stale and polling continues.
pub fn verify_egress(
    probe: &dyn EgressProbe,
    base: &EgressInfo,
    target_country: &str,
    retries: u32,
    interval: Duration,
    control: &RunControl,
    events: &EventSink,
) -> AutomationResult<bool> {
    let target = target_country.to_uppercase();
    for attempt in 1..=retries {
        events.status(format!("Checking egress location ({}/{})...", attempt, retries));
        control.pause_for(interval)?;

        let Some(current) = probe.egress() else {
            events.error("Could not look up the current public IP in this attempt.");
            continue;
        };
        events.status(format!("Current IP: {}, country: {}", current.ip, current.country_code));

        if current.country_code != target {
            continue;
        }
        if current.ip == base.ip && base.country_code != target {
            events.error(format!(
                "Country reports {} but the IP did not change; the lookup may be stale.",
                target
            ));
            continue;
        }
        return Ok(true);
    }
    events.error(format!(
        "Could not verify the switch to {} after {} attempts.",
        target, retries
    ));
    Ok(false)
}

/// Region switch through the NordVPN command line client.
pub struct NordVpnSwitcher<P: EgressProbe> {
    settings: RegionSettings,
    probe: P,
    cli: Option<PathBuf>,
}

impl<P: EgressProbe> NordVpnSwitcher<P> {
    pub fn new(settings: RegionSettings, probe: P) -> Self {
        let cli = find_executable(&settings.cli_path);
        match &cli {
            Some(path) => tracing::info!(cli = %path.display(), "NordVPN CLI found"),
            None => tracing::warn!(cli = %settings.cli_path, "NordVPN CLI not found"),
        }
        Self { settings, probe, cli }
    }

    fn launch_client(&self, cli: &Path, events: &EventSink) -> bool {
        match Command::new(cli).stdout(Stdio::null()).stderr(Stdio::null()).spawn() {
            Ok(_) => true,
            Err(e) => {
                events.error(format!("Failed to start the NordVPN client: {}", e));
                false
            }
        }
    }
}

impl<P: EgressProbe> RegionSwitcher for NordVpnSwitcher<P> {
    fn connect(&mut self, control: &RunControl, events: &EventSink) -> AutomationResult<bool> {
        let Some(cli) = self.cli.clone() else {
            events.error("NordVPN CLI is not available; cannot switch region.");
            return Ok(false);
        };

        events.status("Looking up the original public IP...");
        let Some(base) = self.probe.egress() else {
            events.error("Original public IP unknown; the switch cannot be verified.");
            return Ok(false);
        };
        events.status(format!("Original IP: {}, country: {}", base.ip, base.country_code));

        if !self.launch_client(&cli, events) {
            return Ok(false);
        }
        let startup = secs_to_duration(self.settings.startup_wait_secs);
        events.status(format!("Waiting {}s for the VPN client to start...", startup.as_secs()));
        control.pause_for(startup)?;

        let mut command = Command::new(&cli);
        command.args(["-c", "-g", self.settings.server_group.as_str()]);
        events.status(format!("Connecting to server group '{}'...", self.settings.server_group));
        let outcome = run_with_timeout(
            command,
            secs_to_duration(self.settings.command_timeout_secs),
            control,
        )?;
        if !outcome.succeeded() {
            events.error(format!("Connect command failed: {:?}", outcome));
            return Ok(false);
        }

        let verified = verify_egress(
            &self.probe,
            &base,
            &self.settings.target_country,
            self.settings.verify_retries,
            secs_to_duration(self.settings.verify_interval_secs),
            control,
            events,
        )?;
        if verified {
            events.status(format!(
                "Connected to '{}' ({}), verified by IP.",
                self.settings.server_group, self.settings.target_country
            ));
        }
        Ok(verified)
    }

    fn disconnect(&mut self, events: &EventSink) -> bool {
        let Some(cli) = self.cli.clone() else {
            return false;
        };
        events.status("Disconnecting VPN...");
        // Cleanup must run even after a stop, so it gets its own control
        let cleanup = RunControl::new();
        let mut command = Command::new(&cli);
        command.arg("-d");
        match run_with_timeout(command, secs_to_duration(self.settings.command_timeout_secs), &cleanup) {
            Ok(outcome) if outcome.succeeded() => true,
            Ok(outcome) => {
                events.error(format!("Disconnect command failed: {:?}", outcome));
                false
            }
            Err(e) => {
                events.error(format!("Disconnect interrupted: {}", e));
                false
            }
        }
    }
}
