use crate::{Result, error::Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Device-local numeric identity of a person on the legacy terminal.
///
/// The terminal stores identities as unsigned 16-bit values and reserves 0,
/// so the valid range is 1-65535.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Uid(u16);

impl Uid {
    /// Create a new uid with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidUid` for 0 or values above 65535.
    pub fn new(value: u64) -> Result<Self> {
        match u16::try_from(value) {
            Ok(0) | Err(_) => Err(Error::InvalidUid(format!(
                "uid must be 1-{}, got {value}",
                u16::MAX
            ))),
            Ok(v) => Ok(Uid(v)),
        }
    }

    #[must_use]
    pub fn get(&self) -> u16 {
        self.0
    }

    /// Read a uid from a JSON value that may be a number or a numeric string.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().and_then(|v| Uid::new(v).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl TryFrom<u64> for Uid {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self> {
        Uid::new(value)
    }
}

impl From<Uid> for u64 {
    fn from(uid: Uid) -> Self {
        u64::from(uid.0)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Uid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: u64 = s
            .parse()
            .map_err(|_| Error::InvalidUid(format!("not a number: {s}")))?;
        Uid::new(value)
    }
}

/// Which channel carries an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// One interpreter process per call against the legacy terminal.
    Bridge,
    /// Broadcast command over the message bus, answered on status topics.
    Correlator,
    /// Plain HTTP call to an external service.
    Rest,
}

/// Operations the terminal bridge runs as vendor scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOp {
    TestConnection,
    CreateUser,
    DeleteUser,
    SetPassword,
    EnrollFingerprint,
    RegisterCard,
    ListUsers,
    ClearData,
    AddUser,
    NextFreeUid,
}

impl TerminalOp {
    /// Script file stem for this operation.
    #[must_use]
    pub fn script_name(self) -> &'static str {
        match self {
            TerminalOp::TestConnection => "test_connection",
            TerminalOp::CreateUser => "create_user",
            TerminalOp::DeleteUser => "delete_user",
            TerminalOp::SetPassword => "set_password",
            TerminalOp::EnrollFingerprint => "enroll_finger",
            TerminalOp::RegisterCard => "register_card",
            TerminalOp::ListUsers => "get_users",
            TerminalOp::ClearData => "clear_data",
            TerminalOp::AddUser => "add_user",
            TerminalOp::NextFreeUid => "get_last_uid",
        }
    }

    /// Whether the bridge must see a live connection before running this.
    #[must_use]
    pub fn requires_connectivity(self) -> bool {
        matches!(
            self,
            TerminalOp::CreateUser
                | TerminalOp::DeleteUser
                | TerminalOp::EnrollFingerprint
                | TerminalOp::RegisterCard
                | TerminalOp::AddUser
                | TerminalOp::NextFreeUid
        )
    }
}

/// Verbs understood by the two bus devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusVerb {
    #[serde(rename = "register_fp")]
    RegisterFingerprint,
    #[serde(rename = "delete_fp")]
    DeleteFingerprint,
    #[serde(rename = "register_card")]
    RegisterCard,
    #[serde(rename = "delete_card")]
    DeleteCard,
    #[serde(rename = "delete_user")]
    DeleteUser,
}

impl BusVerb {
    pub const ALL: [BusVerb; 5] = [
        BusVerb::RegisterFingerprint,
        BusVerb::DeleteFingerprint,
        BusVerb::RegisterCard,
        BusVerb::DeleteCard,
        BusVerb::DeleteUser,
    ];

    /// Wire spelling, also used as the `Mode` of status messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BusVerb::RegisterFingerprint => "register_fp",
            BusVerb::DeleteFingerprint => "delete_fp",
            BusVerb::RegisterCard => "register_card",
            BusVerb::DeleteCard => "delete_card",
            BusVerb::DeleteUser => "delete_user",
        }
    }

    /// Status a device reports right after accepting the command.
    #[must_use]
    pub fn progress_status(self) -> &'static str {
        match self {
            BusVerb::RegisterFingerprint => "progress change mode to register fp",
            BusVerb::DeleteFingerprint => "progress change mode to delete fp",
            BusVerb::RegisterCard => "progress change mode to register card",
            BusVerb::DeleteCard => "progress change mode to delete card",
            BusVerb::DeleteUser => "progress change mode to delete user",
        }
    }

    /// Fingerprint verbs carry a finger index after the uid.
    #[must_use]
    pub fn takes_finger_index(self) -> bool {
        matches!(
            self,
            BusVerb::RegisterFingerprint | BusVerb::DeleteFingerprint
        )
    }
}

impl fmt::Display for BusVerb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusVerb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        BusVerb::ALL
            .into_iter()
            .find(|verb| verb.as_str() == s)
            .ok_or_else(|| Error::UnknownVerb(s.to_string()))
    }
}

/// Operations served by external HTTP services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceOp {
    DeleteFace,
    DeletePalm,
}

/// What an operation does. The transport follows from the verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "transport", content = "op", rename_all = "lowercase")]
pub enum Verb {
    Terminal(TerminalOp),
    Bus(BusVerb),
    Service(ServiceOp),
}

impl Verb {
    #[must_use]
    pub fn transport(self) -> Transport {
        match self {
            Verb::Terminal(_) => Transport::Bridge,
            Verb::Bus(_) => Transport::Correlator,
            Verb::Service(_) => Transport::Rest,
        }
    }
}

/// A request to a physical device or device service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOperation {
    pub verb: Verb,
    pub target: Option<Uid>,
    pub parameters: Vec<String>,
}

impl DeviceOperation {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            target: None,
            parameters: Vec::new(),
        }
    }

    pub fn target(mut self, uid: Uid) -> Self {
        self.target = Some(uid);
        self
    }

    pub fn parameter(mut self, value: impl Into<String>) -> Self {
        self.parameters.push(value.into());
        self
    }

    #[must_use]
    pub fn transport(&self) -> Transport {
        self.verb.transport()
    }
}

/// Uniform outcome of every gateway operation.
///
/// Transport-specific failures (non-zero exit, malformed payload, broker
/// disconnect, timeout) all end up here; nothing is raised past a component
/// boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResult {
    /// Successful result with no payload.
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            data: None,
            error: None,
        }
    }

    /// Successful result carrying structured data.
    pub fn with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::ok()
        }
    }

    /// Successful result carrying a human-readable message.
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    /// Failed result.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Failed result built from any displayable error.
    pub fn from_error(err: &impl fmt::Display) -> Self {
        Self::failure(err.to_string())
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Look up a top-level field of `data`.
    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data.as_ref()?.get(key)
    }

    /// Error text, or a placeholder when the failure carried none.
    #[must_use]
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or("Unknown error")
    }

    /// Merge extra fields into `data`, turning it into an object if needed.
    pub fn merge_data(mut self, extra: Map<String, Value>) -> Self {
        let mut object = match self.data.take() {
            Some(Value::Object(map)) => map,
            Some(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
            None => Map::new(),
        };
        object.extend(extra);
        self.data = Some(Value::Object(object));
        self
    }
}

/// Last known reachability of a bridge-backed device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub last_checked: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    pub fn checked(connected: bool, at: DateTime<Utc>) -> Self {
        Self {
            connected,
            last_checked: Some(at),
        }
    }

    /// Whether the last check happened within `window` of `now`.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.last_checked
            .map(|checked| now - checked < window)
            .unwrap_or(false)
    }
}

/// Which bus device answered, derived from its status topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Front,
    Rear,
}

impl Device {
    /// Topics containing `front` belong to the front device; everything else is rear.
    #[must_use]
    pub fn from_topic(topic: &str) -> Self {
        if topic.contains("front") {
            Device::Front
        } else {
            Device::Rear
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Device::Front => f.write_str("front"),
            Device::Rear => f.write_str("rear"),
        }
    }
}

/// Credential kinds tracked per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationKind {
    Card,
    Fingerprint,
    Palm,
    Face,
}

impl RegistrationKind {
    /// Column holding the registered flag for this kind.
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            RegistrationKind::Card => "card_registered",
            RegistrationKind::Fingerprint => "fingerprint_registered",
            RegistrationKind::Palm => "palm_registered",
            RegistrationKind::Face => "face_registered",
        }
    }
}

/// Change of a user's registration state keyed by terminal uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationUpdate {
    pub uid: Uid,
    #[serde(rename = "type")]
    pub kind: RegistrationKind,
    pub registered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(1, true)]
    #[case(65535, true)]
    #[case(0, false)]
    #[case(65536, false)]
    fn test_uid_range(#[case] value: u64, #[case] valid: bool) {
        assert_eq!(Uid::new(value).is_ok(), valid);
    }

    #[test]
    fn test_uid_from_json() {
        assert_eq!(Uid::from_json(&json!(42)), Uid::new(42).ok());
        assert_eq!(Uid::from_json(&json!(" 42 ")), Uid::new(42).ok());
        assert_eq!(Uid::from_json(&json!("abc")), None);
        assert_eq!(Uid::from_json(&json!(null)), None);
    }

    #[test]
    fn test_uid_serde_validates() {
        let uid: Uid = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(uid.get(), 7);
        assert!(serde_json::from_value::<Uid>(json!(0)).is_err());
    }

    #[rstest]
    #[case("register_fp", BusVerb::RegisterFingerprint)]
    #[case("delete_fp", BusVerb::DeleteFingerprint)]
    #[case("register_card", BusVerb::RegisterCard)]
    #[case("delete_card", BusVerb::DeleteCard)]
    #[case("delete_user", BusVerb::DeleteUser)]
    fn test_bus_verb_spelling(#[case] text: &str, #[case] verb: BusVerb) {
        assert_eq!(text.parse::<BusVerb>().unwrap(), verb);
        assert_eq!(verb.to_string(), text);
    }

    #[test]
    fn test_unknown_bus_verb() {
        let err = "reboot".parse::<BusVerb>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown verb: reboot");
    }

    #[test]
    fn test_transport_follows_verb() {
        let op = DeviceOperation::new(Verb::Terminal(TerminalOp::CreateUser))
            .target(Uid::new(3).unwrap())
            .parameter("Alice");
        assert_eq!(op.transport(), Transport::Bridge);
        assert_eq!(
            Verb::Bus(BusVerb::DeleteCard).transport(),
            Transport::Correlator
        );
        assert_eq!(Verb::Service(ServiceOp::DeleteFace).transport(), Transport::Rest);
    }

    #[test]
    fn test_connectivity_requirements() {
        assert!(TerminalOp::CreateUser.requires_connectivity());
        assert!(TerminalOp::NextFreeUid.requires_connectivity());
        assert!(!TerminalOp::SetPassword.requires_connectivity());
        assert!(!TerminalOp::ListUsers.requires_connectivity());
        assert!(!TerminalOp::ClearData.requires_connectivity());
    }

    #[test]
    fn test_operation_result_serialization_omits_empty() {
        let value = serde_json::to_value(OperationResult::failure("boom")).unwrap();
        assert_eq!(value, json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn test_merge_data() {
        let mut extra = Map::new();
        extra.insert("actualUid".into(), json!(9));
        let result = OperationResult::with_data(json!({"success": true})).merge_data(extra);
        assert_eq!(result.data_field("actualUid"), Some(&json!(9)));
        assert_eq!(result.data_field("success"), Some(&json!(true)));
    }

    #[test]
    fn test_connection_status_freshness() {
        let now = Utc::now();
        let status = ConnectionStatus::checked(false, now - chrono::Duration::seconds(30));
        assert!(status.is_fresh(now, chrono::Duration::seconds(60)));
        assert!(!status.is_fresh(now, chrono::Duration::seconds(10)));
        assert!(!ConnectionStatus::default().is_fresh(now, chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_device_from_topic() {
        assert_eq!(Device::from_topic("acs_front_status"), Device::Front);
        assert_eq!(Device::from_topic("acs_rear_status"), Device::Rear);
    }

    #[test]
    fn test_registration_update_wire_shape() {
        let update: RegistrationUpdate = serde_json::from_value(json!({
            "uid": 12,
            "type": "card",
            "registered": true,
            "cardNumber": "0012345"
        }))
        .unwrap();
        assert_eq!(update.kind, RegistrationKind::Card);
        assert_eq!(update.card_number.as_deref(), Some("0012345"));
    }
}
