//! Response envelope shared by the management API and the peer protocol

use serde::{Deserialize, Serialize};

/// `{status_code, data}` on success, `{status_code, error}` otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status_code: 200,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code) && self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::DeserializeOwned;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Lease {
        address: String,
    }

    fn parse<T: DeserializeOwned>(body: &str) -> Envelope<T> {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_error_envelope_omits_data() {
        let envelope: Envelope<()> = Envelope::error(409, "eth1 is already attached to BR_lan");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status_code": 409, "error": "eth1 is already attached to BR_lan"})
        );
        assert!(!envelope.is_success());
    }

    #[test]
    fn test_success_envelope_parses_without_error() {
        let envelope: Envelope<Vec<String>> =
            serde_json::from_str(r#"{"status_code":200,"data":["eth0"]}"#).unwrap();
        assert!(envelope.is_success());
        assert_eq!(envelope.data.unwrap(), vec!["eth0".to_string()]);
    }

    #[test]
    fn test_generic_payload_without_default() {
        let envelope: Envelope<Lease> = parse(r#"{"status_code":200,"data":{"address":"10.0.0.2"}}"#);
        assert_eq!(
            envelope.data,
            Some(Lease {
                address: "10.0.0.2".to_string()
            })
        );

        let failed: Envelope<Lease> = parse(r#"{"status_code":502,"error":"peer refused"}"#);
        assert!(failed.data.is_none());
        assert!(!failed.is_success());
    }
}
