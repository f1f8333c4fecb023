//! Messages as the routing engine sees them, and their on-disk projection.

use crate::error::Error;
use aws_sdk_sqs as sqs;
use std::collections::HashMap;

/// A typed custom attribute attached to a message.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageAttribute {
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "base64_serde::serialize"
    )]
    pub binary_value: Option<Vec<u8>>,
}

/// Binary values are written as base64 strings, the way SQS tooling does.
mod base64_serde {
    use base64::{engine::general_purpose, Engine as _};
    use serde::Serializer;

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => serializer.serialize_str(&general_purpose::STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }
}

impl MessageAttribute {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: "String".to_string(),
            string_value: Some(value.into()),
            binary_value: None,
        }
    }
}

/// A message received from a queue.
///
/// The receipt handle is only valid for the receive that produced it. Receiving
/// the same message again yields a fresh, independently valid handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Unique identifier for the message assigned by the queue
    pub message_id: String,
    /// Handle used to delete the message
    pub receipt_handle: String,
    pub body: Option<String>,
    /// System attributes such as `ApproximateReceiveCount`
    pub attributes: HashMap<String, String>,
    /// Custom attributes set by the producer
    pub message_attributes: HashMap<String, MessageAttribute>,
}

impl Message {
    pub fn new(
        message_id: impl Into<String>,
        receipt_handle: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            receipt_handle: receipt_handle.into(),
            body: Some(body.into()),
            attributes: HashMap::new(),
            message_attributes: HashMap::new(),
        }
    }

    /// The projection of this message that gets written to disk.
    pub fn to_record(&self) -> MessageRecord<'_> {
        MessageRecord {
            body: self.body.as_deref(),
            message_attributes: &self.message_attributes,
            message_id: &self.message_id,
            receipt_handle: &self.receipt_handle,
        }
    }
}

/// Serializable form of a [`Message`], written one JSON object per line.
#[derive(Debug, serde::Serialize)]
pub struct MessageRecord<'a> {
    #[serde(rename = "Body", skip_serializing_if = "Option::is_none")]
    pub body: Option<&'a str>,
    #[serde(rename = "MessageAttributes", skip_serializing_if = "HashMap::is_empty")]
    pub message_attributes: &'a HashMap<String, MessageAttribute>,
    #[serde(rename = "MessageId")]
    pub message_id: &'a str,
    #[serde(rename = "ReceiptHandle")]
    pub receipt_handle: &'a str,
}

impl TryFrom<sqs::types::Message> for Message {
    type Error = Error;

    fn try_from(message: sqs::types::Message) -> Result<Self, Self::Error> {
        let message_id = message
            .message_id
            .ok_or_else(|| Error::MalformedMessage("missing message_id".to_string()))?;
        let receipt_handle = message.receipt_handle.ok_or_else(|| {
            Error::MalformedMessage(format!("missing receipt_handle for {}", message_id))
        })?;

        let attributes = message
            .attributes
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| (name.as_str().to_string(), value))
            .collect();

        let message_attributes = message
            .message_attributes
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| {
                let attribute = MessageAttribute {
                    data_type: value.data_type().to_string(),
                    string_value: value.string_value,
                    binary_value: value.binary_value.map(|blob| blob.into_inner()),
                };
                (name, attribute)
            })
            .collect();

        Ok(Self {
            message_id,
            receipt_handle,
            body: message.body,
            attributes,
            message_attributes,
        })
    }
}

impl TryFrom<&MessageAttribute> for sqs::types::MessageAttributeValue {
    type Error = Error;

    fn try_from(attribute: &MessageAttribute) -> Result<Self, Self::Error> {
        sqs::types::MessageAttributeValue::builder()
            .data_type(&attribute.data_type)
            .set_string_value(attribute.string_value.clone())
            .set_binary_value(
                attribute
                    .binary_value
                    .clone()
                    .map(aws_sdk_sqs::primitives::Blob::new),
            )
            .build()
            .map_err(|e| Error::MalformedMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_uses_dump_field_names() {
        let mut message = Message::new("id-1", "receipt-1", r#"{"a":1}"#);
        message
            .message_attributes
            .insert("origin".to_string(), MessageAttribute::string("billing"));

        let json = serde_json::to_value(message.to_record()).unwrap();

        assert_eq!(json["Body"], r#"{"a":1}"#);
        assert_eq!(json["MessageId"], "id-1");
        assert_eq!(json["ReceiptHandle"], "receipt-1");
        assert_eq!(json["MessageAttributes"]["origin"]["DataType"], "String");
        assert_eq!(json["MessageAttributes"]["origin"]["StringValue"], "billing");
    }

    #[test]
    fn binary_attributes_are_written_as_base64() {
        let mut message = Message::new("id", "rh", "b");
        message.message_attributes.insert(
            "bin".to_string(),
            MessageAttribute {
                data_type: "Binary".to_string(),
                string_value: None,
                binary_value: Some(b"hi".to_vec()),
            },
        );

        let line = serde_json::to_string(&message.to_record()).unwrap();

        assert_eq!(
            line,
            r#"{"Body":"b","MessageAttributes":{"bin":{"DataType":"Binary","BinaryValue":"aGk="}},"MessageId":"id","ReceiptHandle":"rh"}"#
        );
    }

    #[test]
    fn record_omits_missing_body_and_empty_attributes() {
        let mut message = Message::new("id-2", "receipt-2", "");
        message.body = None;

        let line = serde_json::to_string(&message.to_record()).unwrap();

        assert_eq!(line, r#"{"MessageId":"id-2","ReceiptHandle":"receipt-2"}"#);
    }

    #[test]
    fn converts_from_sdk_message() {
        let sdk = sqs::types::Message::builder()
            .message_id("abc")
            .receipt_handle("rh")
            .body("hello")
            .attributes(
                sqs::types::MessageSystemAttributeName::ApproximateReceiveCount,
                "3",
            )
            .message_attributes(
                "kind",
                sqs::types::MessageAttributeValue::builder()
                    .data_type("String")
                    .string_value("order")
                    .build()
                    .unwrap(),
            )
            .build();

        let message = Message::try_from(sdk).unwrap();

        assert_eq!(message.message_id, "abc");
        assert_eq!(message.receipt_handle, "rh");
        assert_eq!(message.body.as_deref(), Some("hello"));
        assert_eq!(message.attributes["ApproximateReceiveCount"], "3");
        assert_eq!(
            message.message_attributes["kind"],
            MessageAttribute::string("order")
        );
    }

    #[test]
    fn rejects_sdk_message_without_receipt() {
        let sdk = sqs::types::Message::builder().message_id("abc").build();
        assert!(matches!(
            Message::try_from(sdk),
            Err(Error::MalformedMessage(_))
        ));
    }
}
