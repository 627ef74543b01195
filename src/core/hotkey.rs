//! Global quick-switch shortcut: parsing of textual key specs such as
//! `ctrl+shift+space` and, on macOS, registration with the Carbon event
//! manager.

use std::fmt;

use crate::core::error::{Error, Result};

pub const CMD_KEY: u32 = 1 << 8;
pub const SHIFT_KEY: u32 = 1 << 9;
pub const OPTION_KEY: u32 = 1 << 11;
pub const CONTROL_KEY: u32 = 1 << 12;

const MODIFIER_NAMES: [(u32, &str); 4] = [
    (CONTROL_KEY, "ctrl"),
    (OPTION_KEY, "opt"),
    (SHIFT_KEY, "shift"),
    (CMD_KEY, "cmd"),
];

// Virtual key codes from HIToolbox/Events.h (ANSI layout positions).
const KEY_CODES: &[(&str, u32)] = &[
    ("a", 0x00),
    ("s", 0x01),
    ("d", 0x02),
    ("f", 0x03),
    ("h", 0x04),
    ("g", 0x05),
    ("z", 0x06),
    ("x", 0x07),
    ("c", 0x08),
    ("v", 0x09),
    ("b", 0x0B),
    ("q", 0x0C),
    ("w", 0x0D),
    ("e", 0x0E),
    ("r", 0x0F),
    ("y", 0x10),
    ("t", 0x11),
    ("1", 0x12),
    ("2", 0x13),
    ("3", 0x14),
    ("4", 0x15),
    ("6", 0x16),
    ("5", 0x17),
    ("9", 0x19),
    ("7", 0x1A),
    ("8", 0x1C),
    ("0", 0x1D),
    ("o", 0x1F),
    ("u", 0x20),
    ("i", 0x22),
    ("p", 0x23),
    ("return", 0x24),
    ("l", 0x25),
    ("j", 0x26),
    ("k", 0x28),
    ("n", 0x2D),
    ("m", 0x2E),
    ("tab", 0x30),
    ("space", 0x31),
    ("escape", 0x35),
    ("f5", 0x60),
    ("f6", 0x61),
    ("f7", 0x62),
    ("f3", 0x63),
    ("f8", 0x64),
    ("f9", 0x65),
    ("f11", 0x67),
    ("f10", 0x6D),
    ("f12", 0x6F),
    ("f4", 0x76),
    ("f2", 0x78),
    ("f1", 0x7A),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hotkey {
    pub key_code: u32,
    pub modifiers: u32,
}

impl Hotkey {
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidHotkey {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let mut modifiers = 0;
        let mut key_code = None;

        for part in spec.split('+').map(|p| p.trim().to_ascii_lowercase()) {
            let modifier = match part.as_str() {
                "cmd" | "command" => Some(CMD_KEY),
                "shift" => Some(SHIFT_KEY),
                "ctrl" | "control" => Some(CONTROL_KEY),
                "opt" | "option" | "alt" => Some(OPTION_KEY),
                _ => None,
            };
            if let Some(modifier) = modifier {
                modifiers |= modifier;
                continue;
            }

            if part.is_empty() {
                return Err(invalid("empty key name"));
            }
            let normalized = match part.as_str() {
                "esc" => "escape",
                "enter" => "return",
                other => other,
            };
            let code = KEY_CODES
                .iter()
                .find(|(name, _)| *name == normalized)
                .map(|(_, code)| *code)
                .ok_or_else(|| invalid(&format!("unknown key `{part}`")))?;
            if key_code.replace(code).is_some() {
                return Err(invalid("more than one non-modifier key"));
            }
        }

        let key_code = key_code.ok_or_else(|| invalid("missing key"))?;
        if modifiers == 0 {
            return Err(invalid("at least one modifier is required"));
        }
        Ok(Self {
            key_code,
            modifiers,
        })
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, name) in MODIFIER_NAMES {
            if self.modifiers & flag != 0 {
                write!(f, "{name}+")?;
            }
        }
        let key = KEY_CODES
            .iter()
            .find(|(_, code)| *code == self.key_code)
            .map(|(name, _)| *name)
            .unwrap_or("?");
        f.write_str(key)
    }
}

#[cfg(target_os = "macos")]
pub use self::carbon::HotkeyRegistration;

#[cfg(target_os = "macos")]
mod carbon {
    use std::ffi::c_void;
    use std::ptr;

    use tracing::{debug, info, warn};

    use super::Hotkey;
    use crate::core::error::{Error, Result};
    use crate::core::macos_api::{
        EventHandlerCallRef, EventHandlerRef, EventHotKeyID, EventHotKeyRef, EventRef,
        EventTypeSpec, GetApplicationEventTarget, InstallEventHandler, RegisterEventHotKey,
        RemoveEventHandler, UnregisterEventHotKey, K_EVENT_CLASS_KEYBOARD,
        K_EVENT_HOTKEY_PRESSED, NO_ERR,
    };

    // 'IBQS'
    const HOTKEY_SIGNATURE: u32 = 0x4942_5153;
    const HOTKEY_ID: u32 = 1;

    type Callback = Box<dyn Fn()>;

    /// A registered global hotkey. Dropping it unregisters the key and
    /// removes the event handler.
    pub struct HotkeyRegistration {
        hotkey: Hotkey,
        hotkey_ref: EventHotKeyRef,
        handler_ref: EventHandlerRef,
        // Referenced by the Carbon handler through its user data pointer.
        _callback: Box<Callback>,
    }

    impl HotkeyRegistration {
        pub fn register(hotkey: Hotkey, on_press: impl Fn() + 'static) -> Result<Self> {
            let mut callback: Box<Callback> = Box::new(Box::new(on_press));
            let user_data = &mut *callback as *mut Callback as *mut c_void;

            let event_type = EventTypeSpec {
                event_class: K_EVENT_CLASS_KEYBOARD,
                event_kind: K_EVENT_HOTKEY_PRESSED,
            };
            let mut handler_ref: EventHandlerRef = ptr::null_mut();
            let status = unsafe {
                InstallEventHandler(
                    GetApplicationEventTarget(),
                    hotkey_handler,
                    1,
                    &event_type,
                    user_data,
                    &mut handler_ref,
                )
            };
            if status != NO_ERR {
                return Err(Error::HotkeyRegistration(status));
            }

            let hotkey_id = EventHotKeyID {
                signature: HOTKEY_SIGNATURE,
                id: HOTKEY_ID,
            };
            let mut hotkey_ref: EventHotKeyRef = ptr::null_mut();
            let status = unsafe {
                RegisterEventHotKey(
                    hotkey.key_code,
                    hotkey.modifiers,
                    hotkey_id,
                    GetApplicationEventTarget(),
                    0,
                    &mut hotkey_ref,
                )
            };
            if status != NO_ERR {
                unsafe {
                    RemoveEventHandler(handler_ref);
                }
                return Err(Error::HotkeyRegistration(status));
            }

            info!("Registered quick-switch hotkey {}", hotkey);
            Ok(Self {
                hotkey,
                hotkey_ref,
                handler_ref,
                _callback: callback,
            })
        }

        pub fn hotkey(&self) -> Hotkey {
            self.hotkey
        }
    }

    impl Drop for HotkeyRegistration {
        fn drop(&mut self) {
            unsafe {
                let status = UnregisterEventHotKey(self.hotkey_ref);
                if status != NO_ERR {
                    warn!("UnregisterEventHotKey returned {}", status);
                }
                RemoveEventHandler(self.handler_ref);
            }
            debug!("Unregistered quick-switch hotkey {}", self.hotkey);
        }
    }

    extern "C" fn hotkey_handler(
        _call: EventHandlerCallRef,
        _event: EventRef,
        user_data: *mut c_void,
    ) -> i32 {
        if !user_data.is_null() {
            let callback = unsafe { &*(user_data as *const Callback) };
            callback();
        }
        NO_ERR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_spec() {
        let hotkey = Hotkey::parse("ctrl+shift+space").unwrap();
        assert_eq!(hotkey.key_code, 0x31);
        assert_eq!(hotkey.modifiers, CONTROL_KEY | SHIFT_KEY);
    }

    #[test]
    fn accepts_aliases_case_and_whitespace() {
        let hotkey = Hotkey::parse(" Command + Alt + K ").unwrap();
        assert_eq!(hotkey.key_code, 0x28);
        assert_eq!(hotkey.modifiers, CMD_KEY | OPTION_KEY);
        assert_eq!(Hotkey::parse("ctrl+esc").unwrap().key_code, 0x35);
        assert_eq!(Hotkey::parse("cmd+f12").unwrap().key_code, 0x6F);
    }

    #[test]
    fn display_is_canonical() {
        let hotkey = Hotkey::parse("shift+control+space").unwrap();
        assert_eq!(hotkey.to_string(), "ctrl+shift+space");
        assert_eq!(Hotkey::parse(&hotkey.to_string()).unwrap(), hotkey);
    }

    #[test]
    fn rejects_malformed_specs() {
        for spec in ["space", "ctrl+shift", "ctrl+a+b", "ctrl+hyper", "ctrl++a", ""] {
            let err = Hotkey::parse(spec).unwrap_err();
            assert!(
                matches!(err, Error::InvalidHotkey { .. }),
                "{spec} should be rejected"
            );
        }
    }
}
