//! Subjects are the units being assigned: users, devices or single requests.
use rand::{thread_rng, Rng};

use crate::ValidationError;

/// Who is being assigned.
///
/// At least one identifier is always present; each present identifier is non-blank. Use
/// [`Subject::stable_key`] to get the key used for bucketing and event logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject {
    user_id: Option<String>,
    device_id: Option<String>,
    request_id: Option<String>,
}

impl Subject {
    pub fn new(
        user_id: Option<&str>,
        device_id: Option<&str>,
        request_id: Option<&str>,
    ) -> Result<Subject, ValidationError> {
        let user_id = validate_identifier(user_id, "user id")?;
        let device_id = validate_identifier(device_id, "device id")?;
        let request_id = validate_identifier(request_id, "request id")?;

        if user_id.is_none() && device_id.is_none() && request_id.is_none() {
            return Err(ValidationError::MissingIdentifier);
        }

        Ok(Subject {
            user_id,
            device_id,
            request_id,
        })
    }

    pub fn from_user_id(user_id: &str) -> Result<Subject, ValidationError> {
        Subject::new(Some(user_id), None, None)
    }

    pub fn from_device_id(device_id: &str) -> Result<Subject, ValidationError> {
        Subject::new(None, Some(device_id), None)
    }

    pub fn from_request_id(request_id: &str) -> Result<Subject, ValidationError> {
        Subject::new(None, None, Some(request_id))
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Key used for bucketing: `user:<id>`, else `device:<id>`, else `request:<id>`.
    ///
    /// When none of these is available the subject gets a fresh `anon:<random>` key on every call,
    /// so anonymous subjects are **not** bucketed reproducibly. A validated `Subject` always holds
    /// an identifier; the anonymous branch only guards values built some other way.
    pub fn stable_key(&self) -> String {
        if let Some(user_id) = &self.user_id {
            format!("user:{user_id}")
        } else if let Some(device_id) = &self.device_id {
            format!("device:{device_id}")
        } else if let Some(request_id) = &self.request_id {
            format!("request:{request_id}")
        } else {
            anonymous_key()
        }
    }
}

fn validate_identifier(
    value: Option<&str>,
    name: &'static str,
) -> Result<Option<String>, ValidationError> {
    match value {
        Some(value) if value.trim().is_empty() => Err(ValidationError::BlankIdentifier(name)),
        Some(value) => Ok(Some(value.to_owned())),
        None => Ok(None),
    }
}

fn anonymous_key() -> String {
    let token: u128 = thread_rng().gen();
    format!("anon:{token:032x}")
}

#[cfg(test)]
mod tests {
    use super::{anonymous_key, Subject};
    use crate::ValidationError;

    #[test]
    fn requires_an_identifier() {
        assert_eq!(
            Subject::new(None, None, None),
            Err(ValidationError::MissingIdentifier)
        );
    }

    #[test]
    fn rejects_blank_identifiers() {
        assert_eq!(
            Subject::new(Some("u1"), Some(" "), None),
            Err(ValidationError::BlankIdentifier("device id"))
        );
        assert_eq!(
            Subject::from_request_id(""),
            Err(ValidationError::BlankIdentifier("request id"))
        );
    }

    #[test]
    fn stable_key_prefers_user_then_device_then_request() {
        let subject = Subject::new(Some("u1"), Some("d1"), Some("r1")).unwrap();
        assert_eq!(subject.stable_key(), "user:u1");

        let subject = Subject::new(None, Some("d1"), Some("r1")).unwrap();
        assert_eq!(subject.stable_key(), "device:d1");

        let subject = Subject::from_request_id("r1").unwrap();
        assert_eq!(subject.stable_key(), "request:r1");
    }

    #[test]
    fn anonymous_keys_are_unique() {
        let a = anonymous_key();
        let b = anonymous_key();
        assert!(a.starts_with("anon:"));
        assert_eq!(a.len(), "anon:".len() + 32);
        assert_ne!(a, b);
    }
}
