use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// Flat string fields, readable by subscribers without knowing the
    /// entity type.
    Map(BTreeMap<String, String>),
    /// Serialized entity, opaque to the broker.
    Object(Bytes),
}

/// A broker message: string properties plus a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    properties: BTreeMap<String, String>,
    body: MessageBody,
}

impl Message {
    pub fn map<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            properties: BTreeMap::new(),
            body: MessageBody::Map(
                fields
                    .into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            ),
        }
    }

    pub fn object<T: Serialize + ?Sized>(payload: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(Self {
            properties: BTreeMap::new(),
            body: MessageBody::Object(Bytes::from(bytes)),
        })
    }

    /// Sets a string property, replacing any previous value under `name`.
    pub fn set_string_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn string_property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    /// Wire form of the body: map messages become a JSON object, object
    /// messages are passed through as serialized.
    pub fn encode_body(&self) -> Result<Bytes> {
        match &self.body {
            MessageBody::Map(fields) => Ok(Bytes::from(serde_json::to_vec(fields)?)),
            MessageBody::Object(bytes) => Ok(bytes.clone()),
        }
    }

    /// Decodes an object message body back into an entity.
    pub fn object_as<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.body {
            MessageBody::Object(bytes) => Ok(serde_json::from_slice(bytes)?),
            MessageBody::Map(_) => Err(Error::Broker {
                message: "map message has no object body".to_string(),
            }),
        }
    }
}
