//! Purpose: Convert DynamoDB attribute values to and from their typed JSON wire form.
//! Exports: `attribute_to_json`, `attribute_from_json`, `item_to_row`, `key_to_token`, `token_to_key`.
//! Role: Keeps rows opaque by emitting exactly the descriptor shape the store speaks.
//! Invariants: Numbers stay strings; binaries are standard base64.
//! Invariants: Conversion is lossless in both directions for every known variant.
#![allow(clippy::result_large_err)]

use std::collections::HashMap;

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::{Map, Value, json};

use crate::core::error::{Error, ErrorKind};
use crate::core::row::{PageToken, Row};

pub fn attribute_to_json(value: &AttributeValue) -> Result<Value, Error> {
    let encoded = match value {
        AttributeValue::S(text) => json!({ "S": text }),
        AttributeValue::N(number) => json!({ "N": number }),
        AttributeValue::B(blob) => json!({ "B": encode_blob(blob) }),
        AttributeValue::Bool(flag) => json!({ "BOOL": flag }),
        AttributeValue::Null(flag) => json!({ "NULL": flag }),
        AttributeValue::Ss(items) => json!({ "SS": items }),
        AttributeValue::Ns(items) => json!({ "NS": items }),
        AttributeValue::Bs(items) => {
            let items: Vec<String> = items.iter().map(encode_blob).collect();
            json!({ "BS": items })
        }
        AttributeValue::L(items) => {
            let items = items
                .iter()
                .map(attribute_to_json)
                .collect::<Result<Vec<_>, _>>()?;
            json!({ "L": items })
        }
        AttributeValue::M(map) => json!({ "M": map_to_json(map)? }),
        _ => {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("store returned an attribute type this build does not know"));
        }
    };
    Ok(encoded)
}

pub fn attribute_from_json(value: &Value) -> Result<AttributeValue, Error> {
    let Some(object) = value.as_object() else {
        return Err(wire_error("attribute value must be an object"));
    };
    if object.len() != 1 {
        return Err(wire_error("attribute value must have exactly one type descriptor"));
    }
    let Some((descriptor, inner)) = object.iter().next() else {
        return Err(wire_error("attribute value is empty"));
    };
    let decoded = match descriptor.as_str() {
        "S" => AttributeValue::S(expect_str(inner, "S")?.to_string()),
        "N" => AttributeValue::N(expect_str(inner, "N")?.to_string()),
        "B" => AttributeValue::B(decode_blob(expect_str(inner, "B")?)?),
        "BOOL" => AttributeValue::Bool(expect_bool(inner, "BOOL")?),
        "NULL" => AttributeValue::Null(expect_bool(inner, "NULL")?),
        "SS" => AttributeValue::Ss(expect_strings(inner, "SS")?),
        "NS" => AttributeValue::Ns(expect_strings(inner, "NS")?),
        "BS" => AttributeValue::Bs(
            expect_strings(inner, "BS")?
                .iter()
                .map(|item| decode_blob(item))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        "L" => {
            let Some(items) = inner.as_array() else {
                return Err(wire_error("L descriptor must hold an array"));
            };
            AttributeValue::L(
                items
                    .iter()
                    .map(attribute_from_json)
                    .collect::<Result<Vec<_>, _>>()?,
            )
        }
        "M" => {
            let Some(map) = inner.as_object() else {
                return Err(wire_error("M descriptor must hold an object"));
            };
            AttributeValue::M(map_from_json(map)?)
        }
        other => return Err(wire_error(&format!("unknown type descriptor {other}"))),
    };
    Ok(decoded)
}

pub fn item_to_row(item: &HashMap<String, AttributeValue>) -> Result<Row, Error> {
    Ok(Row::from_attributes(map_to_json(item)?))
}

pub fn key_to_token(key: &HashMap<String, AttributeValue>) -> Result<PageToken, Error> {
    Ok(PageToken::from_key(map_to_json(key)?))
}

/// Rebuilds the exclusive start key; a token that does not decode is the
/// caller's malformed continuation marker.
pub fn token_to_key(token: &PageToken) -> Result<HashMap<String, AttributeValue>, Error> {
    map_from_json(token.key()).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("malformed continuation token")
            .with_source(err)
    })
}

fn map_to_json(map: &HashMap<String, AttributeValue>) -> Result<Map<String, Value>, Error> {
    let mut out = Map::new();
    for (name, value) in map {
        out.insert(name.clone(), attribute_to_json(value)?);
    }
    Ok(out)
}

fn map_from_json(map: &Map<String, Value>) -> Result<HashMap<String, AttributeValue>, Error> {
    let mut out = HashMap::with_capacity(map.len());
    for (name, value) in map {
        out.insert(name.clone(), attribute_from_json(value)?);
    }
    Ok(out)
}

fn encode_blob(blob: &Blob) -> String {
    aws_smithy_types::base64::encode(blob.as_ref())
}

fn decode_blob(encoded: &str) -> Result<Blob, Error> {
    aws_smithy_types::base64::decode(encoded)
        .map(Blob::new)
        .map_err(|_| wire_error("binary value is not valid base64"))
}

fn expect_str<'a>(value: &'a Value, descriptor: &str) -> Result<&'a str, Error> {
    value
        .as_str()
        .ok_or_else(|| wire_error(&format!("{descriptor} descriptor must hold a string")))
}

fn expect_bool(value: &Value, descriptor: &str) -> Result<bool, Error> {
    value
        .as_bool()
        .ok_or_else(|| wire_error(&format!("{descriptor} descriptor must hold a boolean")))
}

fn expect_strings(value: &Value, descriptor: &str) -> Result<Vec<String>, Error> {
    let Some(items) = value.as_array() else {
        return Err(wire_error(&format!("{descriptor} descriptor must hold an array")));
    };
    items
        .iter()
        .map(|item| expect_str(item, descriptor).map(str::to_string))
        .collect()
}

fn wire_error(detail: &str) -> Error {
    Error::new(ErrorKind::Corrupt).with_message(format!("invalid attribute value: {detail}"))
}
