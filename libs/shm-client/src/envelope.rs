//! The backend wraps payloads as `{"data": T}` or `{"data": [T, ...]}`.
//! Everything past the gateway sees either one record or a list.

use serde::Deserialize;

use crate::{Result, ShmError};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    /// Missing or null reads as `None`.
    pub data: Option<OneOrMany<T>>,
}

impl<T> Envelope<T> {
    /// First element of a list payload, or the object itself.
    pub fn into_one(self) -> Result<T> {
        match self.data {
            Some(OneOrMany::One(item)) => Ok(item),
            Some(OneOrMany::Many(items)) => items.into_iter().next().ok_or(ShmError::EmptyEnvelope),
            None => Err(ShmError::EmptyEnvelope),
        }
    }

    /// Absent or null data is an empty list.
    pub fn into_many(self) -> Vec<T> {
        match self.data {
            Some(OneOrMany::One(item)) => vec![item],
            Some(OneOrMany::Many(items)) => items,
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Rec {
        id: u64,
    }

    fn envelope(value: serde_json::Value) -> Envelope<Rec> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn list_payload_yields_first_record() {
        let env = envelope(json!({"data": [{"id": 1}, {"id": 2}]}));
        assert_eq!(env.into_one().unwrap(), Rec { id: 1 });
    }

    #[test]
    fn object_payload_yields_itself() {
        let env = envelope(json!({"data": {"id": 5}}));
        assert_eq!(env.into_one().unwrap(), Rec { id: 5 });
    }

    #[test]
    fn empty_payloads() {
        assert!(matches!(envelope(json!({"data": []})).into_one(), Err(ShmError::EmptyEnvelope)));
        assert!(envelope(json!({})).into_many().is_empty());
        assert!(envelope(json!({"data": null})).into_many().is_empty());
    }

    #[test]
    fn single_object_becomes_one_element_list() {
        assert_eq!(envelope(json!({"data": {"id": 3}})).into_many(), vec![Rec { id: 3 }]);
    }
}
