//! Wire protocol definitions
//!
//! Pipe-delimited text frames carried as UTF-16LE. Parsing is
//! discriminator-first: the leading field decides how many fields the
//! rest of the frame needs.
//!
//! | Frame          | Layout                                                      |
//! |----------------|-------------------------------------------------------------|
//! | Registration   | `<name>`                                                    |
//! | Name conflict  | `<name>|NAME_EXIST`                                         |
//! | Presence       | `MESSAGE|SERVER|<a,b,c>|<changed>|<STATE>|<server name>`    |
//! | Heartbeat      | `HEARTBEAT`                                                 |
//! | Relay          | `<anything>|<recipient>|...`                                |

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::types::PresenceState;

/// Field separator
pub const FIELD_DELIMITER: char = '|';
/// Separator inside the presence user list
pub const NAME_DELIMITER: char = ',';

pub const HEARTBEAT: &str = "HEARTBEAT";
pub const MESSAGE: &str = "MESSAGE";
pub const SERVER: &str = "SERVER";
pub const NAME_EXIST: &str = "NAME_EXIST";

/// Tokens a client may not register as its name
const RESERVED_NAMES: [&str; 4] = [HEARTBEAT, MESSAGE, SERVER, NAME_EXIST];

/// A decoded protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Client liveness ping, no payload
    Heartbeat,
    /// User-to-user relay; `fields` keeps every raw field so the frame
    /// re-encodes to exactly what was received
    Message {
        recipient: String,
        fields: Vec<String>,
    },
    /// Join/leave notification sent by the server
    PresenceUpdate {
        others: Vec<String>,
        changed: String,
        state: PresenceState,
        server_name: String,
    },
    /// Registration refused
    NameConflict { name: String },
}

impl Frame {
    /// Short kind label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Heartbeat => "heartbeat",
            Frame::Message { .. } => "message",
            Frame::PresenceUpdate { .. } => "presence",
            Frame::NameConflict { .. } => "name_conflict",
        }
    }

    /// Parse frame text
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let raw: Vec<&str> = text.split(FIELD_DELIMITER).collect();
        let parts: Vec<&str> = raw.iter().copied().filter(|f| !f.is_empty()).collect();

        let Some(&discriminator) = parts.first() else {
            return Err(ProtocolError::Empty);
        };

        if discriminator == HEARTBEAT {
            return Ok(Frame::Heartbeat);
        }

        // The user list may be empty, so presence is parsed on raw fields
        if raw[0] == MESSAGE && raw.get(1) == Some(&SERVER) {
            if raw.len() < 6 {
                return Err(ProtocolError::MissingField {
                    kind: "presence",
                    expected: 6,
                    found: raw.len(),
                });
            }
            let state = PresenceState::from_token(raw[4])
                .ok_or_else(|| ProtocolError::UnknownState(raw[4].to_string()))?;
            return Ok(Frame::PresenceUpdate {
                others: raw[2]
                    .split(NAME_DELIMITER)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .collect(),
                changed: raw[3].to_string(),
                state,
                server_name: raw[5].to_string(),
            });
        }

        if parts.len() == 2 && parts[1] == NAME_EXIST {
            return Ok(Frame::NameConflict {
                name: parts[0].to_string(),
            });
        }

        if parts.len() < 2 {
            return Err(ProtocolError::MissingField {
                kind: "message",
                expected: 2,
                found: parts.len(),
            });
        }

        Ok(Frame::Message {
            recipient: parts[1].to_string(),
            fields: raw.into_iter().map(str::to_string).collect(),
        })
    }

    /// Decode raw wire bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::parse(&decode_text(bytes)?)
    }

    /// Render frame text, rejecting names that would break field parsing
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        match self {
            Frame::Heartbeat => Ok(HEARTBEAT.to_string()),
            Frame::Message { fields, .. } => Ok(fields.join("|")),
            Frame::PresenceUpdate {
                others,
                changed,
                state,
                server_name,
            } => {
                for name in others.iter().chain(std::iter::once(changed)) {
                    ensure_no_delimiters(name)?;
                }
                if server_name.contains(FIELD_DELIMITER) {
                    return Err(ProtocolError::InvalidName(server_name.clone()));
                }
                Ok(format!(
                    "{}|{}|{}|{}|{}|{}",
                    MESSAGE,
                    SERVER,
                    others.join(","),
                    changed,
                    state,
                    server_name
                ))
            }
            Frame::NameConflict { name } => Ok(format!("{}|{}", name, NAME_EXIST)),
        }
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        Ok(encode_text(&self.to_text()?))
    }
}

fn ensure_no_delimiters(name: &str) -> Result<(), ProtocolError> {
    if name.contains([FIELD_DELIMITER, NAME_DELIMITER]) {
        return Err(ProtocolError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Check a name offered at registration
///
/// Rejects empty names, delimiters, control characters and protocol tokens.
pub fn validate_name(name: &str) -> Result<(), ProtocolError> {
    if name.is_empty()
        || name.chars().any(char::is_control)
        || RESERVED_NAMES.contains(&name)
    {
        return Err(ProtocolError::InvalidName(name.to_string()));
    }
    ensure_no_delimiters(name)
}

/// Decode the registration frame: the whole text is the name
pub fn parse_registration(bytes: &[u8]) -> Result<String, ProtocolError> {
    let name = decode_text(bytes)?;
    validate_name(&name)?;
    Ok(name)
}

/// UTF-16LE text to bytes
pub fn encode_text(text: &str) -> Bytes {
    text.encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect::<Vec<u8>>()
        .into()
}

/// Bytes to text; input must be whole UTF-16LE code units
pub fn decode_text(bytes: &[u8]) -> Result<String, ProtocolError> {
    if bytes.len() % 2 != 0 {
        return Err(ProtocolError::InvalidEncoding);
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| ProtocolError::InvalidEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_is_utf16le() {
        let bytes = encode_text("hé");
        assert_eq!(&bytes[..], &[b'h', 0, 0xE9, 0]);
        assert_eq!(decode_text(&bytes).unwrap(), "hé");
    }

    #[test]
    fn test_decode_text_rejects_odd_length() {
        assert_eq!(decode_text(&[b'a', 0, b'b']), Err(ProtocolError::InvalidEncoding));
    }

    #[test]
    fn test_decode_text_rejects_lone_surrogate() {
        assert_eq!(decode_text(&[0x00, 0xD8]), Err(ProtocolError::InvalidEncoding));
    }

    #[test]
    fn test_parse_heartbeat() {
        assert_eq!(Frame::parse("HEARTBEAT").unwrap(), Frame::Heartbeat);
    }

    #[test]
    fn test_parse_relay_routes_on_second_field() {
        let frame = Frame::parse("MESSAGE|bob|hello").unwrap();
        match &frame {
            Frame::Message { recipient, .. } => assert_eq!(recipient, "bob"),
            other => panic!("Wrong variant: {:?}", other),
        }
        assert_eq!(frame.to_text().unwrap(), "MESSAGE|bob|hello");
    }

    #[test]
    fn test_parse_relay_skips_empty_fields() {
        let frame = Frame::parse("CALL||bob||x").unwrap();
        match &frame {
            Frame::Message { recipient, .. } => assert_eq!(recipient, "bob"),
            other => panic!("Wrong variant: {:?}", other),
        }
        assert_eq!(frame.to_text().unwrap(), "CALL||bob||x");
    }

    #[test]
    fn test_parse_relay_missing_recipient() {
        assert_eq!(
            Frame::parse("MESSAGE|"),
            Err(ProtocolError::MissingField {
                kind: "message",
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(Frame::parse(""), Err(ProtocolError::Empty));
        assert_eq!(Frame::parse("||"), Err(ProtocolError::Empty));
    }

    #[test]
    fn test_presence_wire_layout() {
        let frame = Frame::PresenceUpdate {
            others: vec!["bob".into(), "carol".into()],
            changed: "alice".into(),
            state: PresenceState::Connected,
            server_name: "Main".into(),
        };
        let text = frame.to_text().unwrap();
        assert_eq!(text, "MESSAGE|SERVER|bob,carol|alice|CONNECTED|Main");
        assert_eq!(Frame::parse(&text).unwrap(), frame);
    }

    #[test]
    fn test_presence_with_no_other_users() {
        let frame = Frame::parse("MESSAGE|SERVER||alice|DISCONNECTED|Main").unwrap();
        assert_eq!(
            frame,
            Frame::PresenceUpdate {
                others: vec![],
                changed: "alice".into(),
                state: PresenceState::Disconnected,
                server_name: "Main".into(),
            }
        );
    }

    #[test]
    fn test_presence_too_short() {
        assert!(matches!(
            Frame::parse("MESSAGE|SERVER|bob|alice"),
            Err(ProtocolError::MissingField { kind: "presence", .. })
        ));
    }

    #[test]
    fn test_presence_unknown_state() {
        assert_eq!(
            Frame::parse("MESSAGE|SERVER|bob|alice|AWAY|Main"),
            Err(ProtocolError::UnknownState("AWAY".into()))
        );
    }

    #[test]
    fn test_presence_encode_rejects_delimiters() {
        let frame = Frame::PresenceUpdate {
            others: vec!["a,b".into()],
            changed: "alice".into(),
            state: PresenceState::Connected,
            server_name: "Main".into(),
        };
        assert_eq!(frame.encode(), Err(ProtocolError::InvalidName("a,b".into())));
    }

    #[test]
    fn test_name_conflict() {
        let frame = Frame::NameConflict { name: "alice".into() };
        assert_eq!(frame.to_text().unwrap(), "alice|NAME_EXIST");
        assert_eq!(Frame::decode(&frame.encode().unwrap()).unwrap(), frame);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("alice").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a|b").is_err());
        assert!(validate_name("a,b").is_err());
        assert!(validate_name("bob\n").is_err());
        assert!(validate_name("SERVER").is_err());
        assert!(validate_name("HEARTBEAT").is_err());
    }

    #[test]
    fn test_parse_registration() {
        assert_eq!(parse_registration(&encode_text("alice")).unwrap(), "alice");
        assert!(parse_registration(&encode_text("al|ice")).is_err());
    }
}
