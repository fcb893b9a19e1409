use std::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};

/// Keys a keypad cell can be mapped to, named after the Linux input key codes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    #[serde(rename = "KEY_ESC")]
    Esc,
    /// The `1` key.
    #[serde(rename = "KEY_1")]
    Key1,
    /// The `2` key.
    #[serde(rename = "KEY_2")]
    Key2,
    /// The `3` key.
    #[serde(rename = "KEY_3")]
    Key3,
    /// The `4` key.
    #[serde(rename = "KEY_4")]
    Key4,
    /// The `5` key.
    #[serde(rename = "KEY_5")]
    Key5,
    /// The `6` key.
    #[serde(rename = "KEY_6")]
    Key6,
    /// The `7` key.
    #[serde(rename = "KEY_7")]
    Key7,
    /// The `8` key.
    #[serde(rename = "KEY_8")]
    Key8,
    /// The `9` key.
    #[serde(rename = "KEY_9")]
    Key9,
    /// The `0` key.
    #[serde(rename = "KEY_0")]
    Key0,
    #[serde(rename = "KEY_BACKSPACE")]
    Backspace,
    #[serde(rename = "KEY_ENTER")]
    Enter,
    #[serde(rename = "KEY_A")]
    KeyA,
    #[serde(rename = "KEY_B")]
    KeyB,
    #[serde(rename = "KEY_C")]
    KeyC,
    #[serde(rename = "KEY_D")]
    KeyD,
    #[serde(rename = "KEY_E")]
    KeyE,
    #[serde(rename = "KEY_F")]
    KeyF,
    /// Keypad `*`.
    #[serde(rename = "KEY_KPASTERISK")]
    KpAsterisk,
    /// Keypad `-`.
    #[serde(rename = "KEY_KPMINUS")]
    KpMinus,
    /// Keypad `+`.
    #[serde(rename = "KEY_KPPLUS")]
    KpPlus,
    /// Keypad `.`.
    #[serde(rename = "KEY_KPDOT")]
    KpDot,
    /// Keypad enter, commonly wired to the `#` key.
    #[serde(rename = "KEY_KPENTER")]
    KpEnter,
    /// Keypad `/`.
    #[serde(rename = "KEY_KPSLASH")]
    KpSlash,
    #[serde(rename = "KEY_UP")]
    Up,
    #[serde(rename = "KEY_LEFT")]
    Left,
    #[serde(rename = "KEY_RIGHT")]
    Right,
    #[serde(rename = "KEY_DOWN")]
    Down,
}

impl KeyCode {
    /// Gets the numeric code from `linux/input-event-codes.h`.
    pub fn code(self) -> u16 {
        use KeyCode::*;

        match self {
            Esc => 1,
            Key1 => 2,
            Key2 => 3,
            Key3 => 4,
            Key4 => 5,
            Key5 => 6,
            Key6 => 7,
            Key7 => 8,
            Key8 => 9,
            Key9 => 10,
            Key0 => 11,
            Backspace => 14,
            KeyE => 18,
            Enter => 28,
            KeyA => 30,
            KeyD => 32,
            KeyF => 33,
            KeyC => 46,
            KeyB => 48,
            KpAsterisk => 55,
            KpMinus => 74,
            KpPlus => 78,
            KpDot => 83,
            KpEnter => 96,
            KpSlash => 98,
            Up => 103,
            Left => 105,
            Right => 106,
            Down => 108,
        }
    }

    /// Converts the [KeyCode] to the character printed on a typical keypad, if any.
    pub fn to_char(self) -> Option<char> {
        use KeyCode::*;

        match self {
            Key1 => Some('1'),
            Key2 => Some('2'),
            Key3 => Some('3'),
            Key4 => Some('4'),
            Key5 => Some('5'),
            Key6 => Some('6'),
            Key7 => Some('7'),
            Key8 => Some('8'),
            Key9 => Some('9'),
            Key0 => Some('0'),
            KeyA => Some('A'),
            KeyB => Some('B'),
            KeyC => Some('C'),
            KeyD => Some('D'),
            KeyE => Some('E'),
            KeyF => Some('F'),
            KpAsterisk => Some('*'),
            KpMinus => Some('-'),
            KpPlus => Some('+'),
            KpDot => Some('.'),
            KpEnter => Some('#'),
            KpSlash => Some('/'),
            _ => None,
        }
    }
}

impl Display for KeyCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.to_char() {
            Some(c) => write!(f, "'{}'", c),
            None => write!(f, "{:?}", self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_linux_key_names() {
        let keys: Vec<KeyCode> = serde_json::from_str(r#"["KEY_0", "KEY_KPENTER", "KEY_BACKSPACE"]"#).unwrap();
        assert_eq!(keys, vec![KeyCode::Key0, KeyCode::KpEnter, KeyCode::Backspace]);
        assert_eq!(keys.iter().map(|key| key.code()).collect::<Vec<_>>(), vec![11, 96, 14]);
    }

    #[test]
    fn rejects_unknown_key_names() {
        assert!(serde_json::from_str::<KeyCode>(r#""KEY_POWER""#).is_err());
    }

    #[test]
    fn displays_the_printed_label() {
        assert_eq!(KeyCode::KpEnter.to_string(), "'#'");
        assert_eq!(KeyCode::Backspace.to_string(), "Backspace");
    }
}
