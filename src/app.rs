use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use crate::core::control::ControlCommand;
use crate::core::hotkey::{hotkey_label, spawn_listener};
use crate::core::worker::{EventSink, Worker, WorkerEvent};
use crate::error::AutomationResult;
use crate::settings::HotkeySettings;
use crate::tools::batch::BatchRunner;

const POLL: Duration = Duration::from_millis(100);

/// Console commands accepted next to the hotkeys.
pub fn parse_console_command(line: &str) -> Option<ControlCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "p" | "pause" | "r" | "resume" => Some(ControlCommand::TogglePause),
        "s" | "stop" | "q" | "quit" => Some(ControlCommand::Stop),
        _ => None,
    }
}

/// Supervisor: owns the worker, forwards pause/stop requests and prints what
/// the worker reports.
pub struct BatchApp {
    worker: Worker,
    events: Receiver<WorkerEvent>,
    commands: Receiver<ControlCommand>,
    command_tx: Sender<ControlCommand>,
}

impl BatchApp {
    pub fn new() -> Self {
        let (sink, events) = EventSink::channel();
        let (command_tx, commands) = mpsc::channel();
        Self {
            worker: Worker::new(sink),
            events,
            commands,
            command_tx,
        }
    }

    /// Sender for anything that wants to pause or stop the run.
    pub fn commands(&self) -> Sender<ControlCommand> {
        self.command_tx.clone()
    }

    /// Register the global hotkeys and read console commands from stdin.
    pub fn attach_inputs(&self, hotkeys: &HotkeySettings) {
        println!(
            "Controls: {} or 'p' + Enter to pause/resume, {} or 's' + Enter to stop.",
            hotkey_label(&hotkeys.pause_toggle),
            hotkey_label(&hotkeys.hard_stop)
        );
        spawn_listener(hotkeys.clone(), self.commands());

        let tx = self.commands();
        let spawned = thread::Builder::new().name("console".to_string()).spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_console_command(&line) {
                    Some(command) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => println!("Unknown command '{}'. Use 'p' or 's'.", line.trim()),
                }
            }
        });
        if let Err(e) = spawned {
            tracing::warn!("Failed to start console reader: {}", e);
        }
    }

    pub fn start(&mut self, runner: BatchRunner) -> AutomationResult<()> {
        self.worker.start(move |control, events| runner.run(control, events).to_string())
    }

    fn handle(&self, command: ControlCommand) {
        match command {
            ControlCommand::TogglePause => {
                self.worker.toggle_pause();
            }
            ControlCommand::Stop => {
                self.worker.stop();
            }
        }
    }

    /// Forward commands and print events until the worker reports its summary.
    pub fn run_until_finished(&mut self) -> String {
        loop {
            while let Ok(command) = self.commands.try_recv() {
                self.handle(command);
            }

            match self.events.recv_timeout(POLL) {
                Ok(WorkerEvent::Finished { summary }) => {
                    println!("{}", summary);
                    self.worker.join();
                    return summary;
                }
                Ok(event) => print_event(&event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.worker.join();
                    return "Worker ended without a summary.".to_string();
                }
            }
        }
    }
}

impl Default for BatchApp {
    fn default() -> Self {
        Self::new()
    }
}

fn print_event(event: &WorkerEvent) {
    match event {
        WorkerEvent::Status { message, is_error } => {
            if *is_error {
                println!("[!] {}", message);
            } else {
                println!("    {}", message);
            }
        }
        WorkerEvent::Progress { processed, total } => println!("Progress: {}/{}", processed, total),
        WorkerEvent::ImageCount { current, total } => println!("Image {}/{}", current, total),
        WorkerEvent::Finished { summary } => println!("{}", summary),
    }
}
