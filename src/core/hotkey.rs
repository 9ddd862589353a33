use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};

use crate::core::control::ControlCommand;
use crate::settings::{HotkeyConfig, HotkeyKey, HotkeyModifiers, HotkeySettings};

pub fn hotkey_label(config: &HotkeyConfig) -> String {
    let Some(key) = config.key else {
        return "Disabled".to_string();
    };

    let mut parts: Vec<&'static str> = Vec::new();
    if config.modifiers.ctrl {
        parts.push("Ctrl");
    }
    if config.modifiers.alt {
        parts.push("Alt");
    }
    if config.modifiers.shift {
        parts.push("Shift");
    }
    if config.modifiers.meta {
        parts.push("Meta");
    }
    parts.push(hotkey_key_label(key));
    parts.join("+")
}

pub fn hotkey_from_config(config: &HotkeyConfig) -> Option<HotKey> {
    let key = config.key?;
    let code = hotkey_key_to_code(key);
    let modifiers = hotkey_modifiers_to_code(config.modifiers);
    if modifiers.is_empty() {
        Some(HotKey::new(None, code))
    } else {
        Some(HotKey::new(Some(modifiers), code))
    }
}

fn hotkey_key_label(key: HotkeyKey) -> &'static str {
    match key {
        HotkeyKey::P => "P",
        HotkeyKey::S => "S",
        HotkeyKey::Numpad0 => "Num 0",
        HotkeyKey::Pause => "Pause",
        HotkeyKey::Escape => "Esc",
        HotkeyKey::F6 => "F6",
        HotkeyKey::F7 => "F7",
        HotkeyKey::F8 => "F8",
        HotkeyKey::F9 => "F9",
        HotkeyKey::F10 => "F10",
        HotkeyKey::F11 => "F11",
        HotkeyKey::F12 => "F12",
    }
}

fn hotkey_key_to_code(key: HotkeyKey) -> Code {
    match key {
        HotkeyKey::P => Code::KeyP,
        HotkeyKey::S => Code::KeyS,
        HotkeyKey::Numpad0 => Code::Numpad0,
        HotkeyKey::Pause => Code::Pause,
        HotkeyKey::Escape => Code::Escape,
        HotkeyKey::F6 => Code::F6,
        HotkeyKey::F7 => Code::F7,
        HotkeyKey::F8 => Code::F8,
        HotkeyKey::F9 => Code::F9,
        HotkeyKey::F10 => Code::F10,
        HotkeyKey::F11 => Code::F11,
        HotkeyKey::F12 => Code::F12,
    }
}

fn hotkey_modifiers_to_code(modifiers: HotkeyModifiers) -> Modifiers {
    let mut mods = Modifiers::empty();
    if modifiers.ctrl {
        mods |= Modifiers::CONTROL;
    }
    if modifiers.alt {
        mods |= Modifiers::ALT;
    }
    if modifiers.shift {
        mods |= Modifiers::SHIFT;
    }
    if modifiers.meta {
        mods |= Modifiers::META;
    }
    mods
}

/// Registered hotkey ids and the command each one issues.
struct Bindings {
    toggle: Option<u32>,
    stop: Option<u32>,
}

impl Bindings {
    fn command_for(&self, event: &GlobalHotKeyEvent) -> Option<ControlCommand> {
        if event.state != HotKeyState::Pressed {
            return None;
        }
        if Some(event.id) == self.toggle {
            Some(ControlCommand::TogglePause)
        } else if Some(event.id) == self.stop {
            Some(ControlCommand::Stop)
        } else {
            None
        }
    }
}

fn register(manager: &GlobalHotKeyManager, name: &str, config: &HotkeyConfig) -> Option<u32> {
    let hotkey = hotkey_from_config(config)?;
    match manager.register(hotkey) {
        Ok(()) => {
            tracing::info!("{} hotkey: {}", name, hotkey_label(config));
            Some(hotkey.id())
        }
        Err(e) => {
            tracing::warn!("Failed to register {} hotkey {}: {}", name, hotkey_label(config), e);
            None
        }
    }
}

/// Listen for the pause and stop hotkeys on a background thread.
///
/// The manager has to live on the thread that pumps its messages, so it is
/// created there. Failure to register only costs the hotkeys; console
/// commands keep working.
pub fn spawn_listener(settings: HotkeySettings, commands: Sender<ControlCommand>) {
    let spawned = thread::Builder::new()
        .name("hotkeys".to_string())
        .spawn(move || {
            let manager = match GlobalHotKeyManager::new() {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("Failed to create hotkey manager: {}", e);
                    return;
                }
            };

            let bindings = Bindings {
                toggle: register(&manager, "pause/resume", &settings.pause_toggle),
                stop: register(&manager, "stop", &settings.hard_stop),
            };
            if bindings.toggle.is_none() && bindings.stop.is_none() {
                return;
            }

            let receiver = GlobalHotKeyEvent::receiver();
            loop {
                pump_messages();
                while let Ok(event) = receiver.try_recv() {
                    if let Some(command) = bindings.command_for(&event) {
                        tracing::debug!(?command, "hotkey pressed");
                        if commands.send(command).is_err() {
                            return;
                        }
                    }
                }
                thread::sleep(Duration::from_millis(20));
            }
        });

    if let Err(e) = spawned {
        tracing::warn!("Failed to start hotkey thread: {}", e);
    }
}

#[cfg(windows)]
fn pump_messages() {
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
    };

    unsafe {
        let mut msg = MSG::default();
        while PeekMessageW(&mut msg, HWND(0), 0, 0, PM_REMOVE).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

#[cfg(not(windows))]
fn pump_messages() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::HotkeySettings;

    #[test]
    fn test_default_labels() {
        let defaults = HotkeySettings::default();
        assert_eq!(hotkey_label(&defaults.pause_toggle), "Num 0");
        assert_eq!(hotkey_label(&defaults.hard_stop), "Shift+Esc");
        assert_eq!(hotkey_label(&HotkeyConfig::default()), "Disabled");
    }

    #[test]
    fn test_config_maps_to_distinct_hotkeys() {
        let defaults = HotkeySettings::default();
        let toggle = hotkey_from_config(&defaults.pause_toggle).unwrap();
        let stop = hotkey_from_config(&defaults.hard_stop).unwrap();
        assert_eq!(toggle, HotKey::new(None, Code::Numpad0));
        assert_eq!(stop, HotKey::new(Some(Modifiers::SHIFT), Code::Escape));
        assert_ne!(toggle.id(), stop.id());
        assert!(hotkey_from_config(&HotkeyConfig::default()).is_none());
    }
}
