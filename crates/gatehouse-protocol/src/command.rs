//! Bus command strings.
//!
//! Devices accept a single flat string:
//!
//! ```text
//! mode;<verb>;<uid>[;<extra>]
//!
//! mode;register_fp;12;3     enroll finger 3 for uid 12
//! mode;delete_card;12       drop the card of uid 12
//! ```
//!
//! The string carries no correlation id; the devices would not echo it back.

use gatehouse_core::constants::{COMMAND_DELIMITER, COMMAND_PREFIX};
use gatehouse_core::{BusVerb, Error, Result, Uid};
use std::fmt;
use std::str::FromStr;

/// Highest finger index a terminal accepts.
const MAX_FINGER_INDEX: u8 = 9;

/// A command for the two bus devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: BusVerb,
    uid: Uid,
    finger_index: Option<u8>,
}

impl Command {
    pub fn register_fingerprint(uid: Uid, finger_index: u8) -> Result<Self> {
        Self::new(BusVerb::RegisterFingerprint, uid, Some(finger_index))
    }

    pub fn delete_fingerprint(uid: Uid, finger_index: u8) -> Result<Self> {
        Self::new(BusVerb::DeleteFingerprint, uid, Some(finger_index))
    }

    pub fn register_card(uid: Uid) -> Self {
        Self {
            verb: BusVerb::RegisterCard,
            uid,
            finger_index: None,
        }
    }

    pub fn delete_card(uid: Uid) -> Self {
        Self {
            verb: BusVerb::DeleteCard,
            uid,
            finger_index: None,
        }
    }

    pub fn delete_user(uid: Uid) -> Self {
        Self {
            verb: BusVerb::DeleteUser,
            uid,
            finger_index: None,
        }
    }

    /// Build a command, checking the finger index against the verb.
    ///
    /// # Errors
    /// Returns `Error::InvalidCommand` when a fingerprint verb lacks a finger
    /// index, another verb carries one, or the index is above 9.
    pub fn new(verb: BusVerb, uid: Uid, finger_index: Option<u8>) -> Result<Self> {
        match (verb.takes_finger_index(), finger_index) {
            (true, None) => Err(Error::InvalidCommand(format!(
                "{verb} requires a finger index"
            ))),
            (false, Some(_)) => Err(Error::InvalidCommand(format!(
                "{verb} does not take a finger index"
            ))),
            (true, Some(index)) if index > MAX_FINGER_INDEX => Err(Error::InvalidCommand(
                format!("finger index must be 0-{MAX_FINGER_INDEX}, got {index}"),
            )),
            _ => Ok(Self {
                verb,
                uid,
                finger_index,
            }),
        }
    }

    #[must_use]
    pub fn verb(&self) -> BusVerb {
        self.verb
    }

    #[must_use]
    pub fn uid(&self) -> Uid {
        self.uid
    }

    #[must_use]
    pub fn finger_index(&self) -> Option<u8> {
        self.finger_index
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{COMMAND_PREFIX}{COMMAND_DELIMITER}{}{COMMAND_DELIMITER}{}",
            self.verb, self.uid
        )?;
        if let Some(index) = self.finger_index {
            write!(f, "{COMMAND_DELIMITER}{index}")?;
        }
        Ok(())
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(COMMAND_DELIMITER).collect();

        let [prefix, verb, uid, rest @ ..] = parts.as_slice() else {
            return Err(Error::InvalidCommand(format!(
                "expected {COMMAND_PREFIX};<verb>;<uid>[;<extra>], got {s:?}"
            )));
        };

        if *prefix != COMMAND_PREFIX {
            return Err(Error::InvalidCommand(format!(
                "command must start with {COMMAND_PREFIX:?}"
            )));
        }

        let verb: BusVerb = verb.parse()?;
        let uid: Uid = uid.parse()?;
        let finger_index = match rest {
            [] => None,
            [extra] => Some(extra.parse::<u8>().map_err(|_| {
                Error::InvalidCommand(format!("invalid finger index: {extra}"))
            })?),
            _ => {
                return Err(Error::InvalidCommand(format!(
                    "too many fields in {s:?}"
                )));
            }
        };

        Command::new(verb, uid, finger_index)
    }
}
