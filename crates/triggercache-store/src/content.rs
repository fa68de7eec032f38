use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// A cached HTTP response: status, content type and body.
///
/// Stores see it only as the opaque blob produced by [`CachedContent::to_blob`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedContent {
    #[serde(rename = "status_code")]
    status: u16,
    content_type: String,
    #[serde(rename = "data", with = "base64_body")]
    body: Bytes,
}

impl CachedContent {
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn to_blob(&self) -> Result<Bytes, StoreError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self, StoreError> {
        Ok(serde_json::from_slice(blob)?)
    }
}

mod base64_body {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_uses_wire_field_names() {
        let content = CachedContent::new(201, "application/json", "{}");
        let blob = content.to_blob().expect("encode");
        let value: serde_json::Value = serde_json::from_slice(&blob).expect("json");

        assert_eq!(value["status_code"], 201);
        assert_eq!(value["content_type"], "application/json");
        assert_eq!(value["data"], "e30=");
    }

    #[test]
    fn binary_body_survives_blob() {
        let body: Vec<u8> = (0u8..=255).collect();
        let content = CachedContent::new(200, "application/octet-stream", body.clone());

        let decoded = CachedContent::from_blob(&content.to_blob().expect("encode")).expect("decode");
        assert_eq!(decoded.body().as_ref(), body.as_slice());
        assert_eq!(decoded, content);
    }

    #[test]
    fn malformed_blob_is_codec_error() {
        let err = CachedContent::from_blob(b"not json").expect_err("should fail");
        assert!(matches!(err, StoreError::Codec(_)));

        let err = CachedContent::from_blob(
            br#"{"status_code":200,"content_type":"text/plain","data":"%%%"}"#,
        )
        .expect_err("bad base64 should fail");
        assert!(matches!(err, StoreError::Codec(_)));
    }
}
