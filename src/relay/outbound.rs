//! Outbound send requests

use serde::{Deserialize, Serialize};

use super::RelayError;

/// Request to send a text message
///
/// Deserializes from the `POST /send-message` body `{number, message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundSendRequest {
    #[serde(rename = "number", default)]
    pub destination_address: String,
    #[serde(rename = "message", default)]
    pub body_text: String,
}

impl OutboundSendRequest {
    pub fn new(destination_address: impl Into<String>, body_text: impl Into<String>) -> Self {
        Self {
            destination_address: destination_address.into(),
            body_text: body_text.into(),
        }
    }

    /// Both fields are required; a bare number must keep at least one
    /// character once formatting is stripped
    pub fn validate(&self) -> Result<(), RelayError> {
        let destination = self.destination_address.trim();
        let missing_number =
            destination.is_empty() || (!destination.contains('@') && bare_number(destination).is_empty());
        let missing_message = self.body_text.trim().is_empty();
        match (missing_number, missing_message) {
            (true, true) => Err(RelayError::InvalidRequest(
                "Number and message are required".to_string(),
            )),
            (true, false) => Err(RelayError::InvalidRequest("Number is required".to_string())),
            (false, true) => Err(RelayError::InvalidRequest("Message is required".to_string())),
            (false, false) => Ok(()),
        }
    }
}

/// Delivery acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    /// Address the transport was asked to deliver to
    pub to: String,
}

/// Normalize a caller-supplied destination to the transport's scheme
///
/// Addresses that already carry a domain (`...@s.whatsapp.net`,
/// `...@g.us`) pass through untouched. Bare numbers lose formatting
/// characters (`+`, spaces, dashes, dots, parentheses) and gain
/// `@<suffix>`.
pub fn normalize_address(destination: &str, suffix: &str) -> String {
    let destination = destination.trim();
    if destination.contains('@') {
        return destination.to_string();
    }

    format!("{}@{}", bare_number(destination), suffix.trim_start_matches('@'))
}

fn bare_number(destination: &str) -> String {
    destination
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-' | '.' | '(' | ')'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_number_gets_suffix() {
        assert_eq!(
            normalize_address("34600000000", "s.whatsapp.net"),
            "34600000000@s.whatsapp.net"
        );
    }

    #[test]
    fn test_formatting_is_stripped() {
        assert_eq!(
            normalize_address("+34 600-00.00 (00)", "c.us"),
            "34600000000@c.us"
        );
    }

    #[test]
    fn test_full_address_passes_through() {
        assert_eq!(
            normalize_address("120363000000@g.us", "s.whatsapp.net"),
            "120363000000@g.us"
        );
    }

    #[test]
    fn test_suffix_with_leading_at() {
        assert_eq!(normalize_address("1", "@c.us"), "1@c.us");
    }

    #[test]
    fn test_validation() {
        assert!(OutboundSendRequest::new("1", "hi").validate().is_ok());
        assert!(matches!(
            OutboundSendRequest::new("", "hi").validate(),
            Err(RelayError::InvalidRequest(_))
        ));
        assert!(matches!(
            OutboundSendRequest::new("1", "   ").validate(),
            Err(RelayError::InvalidRequest(_))
        ));
        for formatting_only in ["+", " ( ) ", "--."] {
            assert!(matches!(
                OutboundSendRequest::new(formatting_only, "hi").validate(),
                Err(RelayError::InvalidRequest(_))
            ));
        }
        assert!(OutboundSendRequest::new("120363000000@g.us", "hi").validate().is_ok());
    }

    #[test]
    fn test_deserializes_from_http_body() {
        let req: OutboundSendRequest =
            serde_json::from_str(r#"{"number":"34600000000","message":"Hola"}"#).unwrap();
        assert_eq!(req, OutboundSendRequest::new("34600000000", "Hola"));

        let req: OutboundSendRequest = serde_json::from_str(r#"{"message":"Hola"}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
