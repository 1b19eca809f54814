use chrono::{DateTime, Utc};
use gatehouse_core::{RegistrationKind, Uid};
use serde::{Deserialize, Serialize};

/// Dashboard user and the credentials registered for them.
///
/// `zkteco_uid` is the user's numeric identity on the fingerprint/card
/// terminal; registration updates coming from the devices are matched on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub status: String,
    pub card_registered: bool,
    pub fingerprint_registered: bool,
    pub palm_registered: bool,
    pub face_registered: bool,
    pub card_number: Option<String>,
    /// Identifier assigned by the face recognition service
    pub face_api_id: Option<String>,
    pub zkteco_uid: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl User {
    /// Terminal uid, if assigned and in range.
    pub fn terminal_uid(&self) -> Option<Uid> {
        self.zkteco_uid
            .and_then(|uid| u64::try_from(uid).ok())
            .and_then(|uid| Uid::new(uid).ok())
    }

    pub fn is_registered(&self, kind: RegistrationKind) -> bool {
        match kind {
            RegistrationKind::Card => self.card_registered,
            RegistrationKind::Fingerprint => self.fingerprint_registered,
            RegistrationKind::Palm => self.palm_registered,
            RegistrationKind::Face => self.face_registered,
        }
    }
}

/// Fields supplied when creating a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub zkteco_uid: Option<Uid>,
}

impl NewUser {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            department: None,
            zkteco_uid: None,
        }
    }

    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn zkteco_uid(mut self, uid: Uid) -> Self {
        self.zkteco_uid = Some(uid);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(zkteco_uid: Option<i64>) -> User {
        let now = Utc::now();
        User {
            id: "u-1".to_string(),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            department: None,
            status: "active".to_string(),
            card_registered: true,
            fingerprint_registered: false,
            palm_registered: false,
            face_registered: true,
            card_number: Some("0012345".to_string()),
            face_api_id: None,
            zkteco_uid,
            created_at: now,
            updated_at: now,
            last_seen: None,
        }
    }

    #[test]
    fn test_terminal_uid() {
        assert_eq!(user(Some(12)).terminal_uid(), Uid::new(12).ok());
        assert_eq!(user(Some(0)).terminal_uid(), None);
        assert_eq!(user(Some(-4)).terminal_uid(), None);
        assert_eq!(user(None).terminal_uid(), None);
    }

    #[test]
    fn test_is_registered() {
        let user = user(None);
        assert!(user.is_registered(RegistrationKind::Card));
        assert!(user.is_registered(RegistrationKind::Face));
        assert!(!user.is_registered(RegistrationKind::Fingerprint));
        assert!(!user.is_registered(RegistrationKind::Palm));
    }
}
