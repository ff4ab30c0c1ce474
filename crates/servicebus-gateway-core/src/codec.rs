//! JSON body codec.
//!
//! Payloads are written as compact UTF-8 JSON. Reading is lenient about key
//! casing: an object key matches a struct field when the two are equal
//! ignoring ASCII case, so `{"Text": "..."}` decodes into a field named
//! `text`. The match is applied recursively through nested structs,
//! sequences, maps and options.

use bytes::Bytes;
use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{DeserializeOwned, Deserializer, IntoDeserializer, Visitor};
use serde::{forward_to_deserialize_any, Serialize};
use serde_json::Value;
use servicebus_runtime::Message;

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;

/// Content type stamped on every encoded message
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Serialize `payload` into a message body
pub fn encode<T>(payload: &T) -> Result<Message, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(payload)?;
    Ok(Message::new(Bytes::from(body)).with_content_type(JSON_CONTENT_TYPE))
}

/// Parse a JSON body into `T`, matching object keys to fields ignoring case
pub fn decode<T>(body: &[u8]) -> Result<T, serde_json::Error>
where
    T: DeserializeOwned,
{
    let value: Value = serde_json::from_slice(body)?;
    T::deserialize(CaseInsensitive(value))
}

/// Deserializer over a parsed JSON value that folds key case onto field names
struct CaseInsensitive(Value);

impl CaseInsensitive {
    fn visit_object<'de, I, V>(entries: I, visitor: V) -> Result<V::Value, serde_json::Error>
    where
        I: IntoIterator<Item = (String, Value)>,
        V: Visitor<'de>,
    {
        let mut access: MapDeserializer<'de, _, serde_json::Error> = MapDeserializer::new(
            entries
                .into_iter()
                .map(|(key, value)| (key, CaseInsensitive(value))),
        );
        let value = visitor.visit_map(&mut access)?;
        access.end()?;
        Ok(value)
    }
}

impl<'de> IntoDeserializer<'de, serde_json::Error> for CaseInsensitive {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

impl<'de> Deserializer<'de> for CaseInsensitive {
    type Error = serde_json::Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Number(n) => n.deserialize_any(visitor),
            Value::String(s) => visitor.visit_string(s),
            Value::Array(items) => {
                let mut access: SeqDeserializer<_, serde_json::Error> =
                    SeqDeserializer::new(items.into_iter().map(CaseInsensitive));
                let value = visitor.visit_seq(&mut access)?;
                access.end()?;
                Ok(value)
            }
            Value::Object(map) => Self::visit_object(map, visitor),
        }
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(CaseInsensitive(other)),
        }
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            Value::Object(map) => {
                // Keys that fold onto the same field stay separate entries so
                // the visitor reports them as a duplicate field
                let renamed: Vec<(String, Value)> = map
                    .into_iter()
                    .map(|(key, value)| {
                        let key = fields
                            .iter()
                            .find(|field| field.eq_ignore_ascii_case(&key))
                            .map(|field| field.to_string())
                            .unwrap_or(key);
                        (key, value)
                    })
                    .collect();
                Self::visit_object(renamed, visitor)
            }
            other => CaseInsensitive(other).deserialize_any(visitor),
        }
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        // Variant payloads keep exact-case matching
        self.0.deserialize_enum(name, variants, visitor)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map identifier
        ignored_any
    }
}
