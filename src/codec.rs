//! Typed record encoding and index value extraction.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors raised while encoding or decoding a record.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
   #[error("failed to encode record: {0}")]
   Encode(String),

   #[error("failed to decode record: {0}")]
   Decode(String),
}

/// A caller-defined record type stored in a collection.
///
/// Implementors provide a canonical, lossless byte encoding and a way to
/// extract the value used for each of the collection's named indexes.
/// [`encode_json`] and [`decode_json`] cover the common case of an
/// `impl Serialize + DeserializeOwned` type backed by JSON, matching the
/// row-value convention used elsewhere in this crate's storage layer.
pub trait Record: Sized + Send + Sync + 'static {
   /// The stable field used as this record's row key.
   fn primary_key(&self) -> String;

   /// Encodes this record to its canonical byte representation.
   fn encode(&self) -> Result<Vec<u8>, CodecError>;

   /// Decodes a record from its canonical byte representation.
   fn decode(bytes: &[u8]) -> Result<Self, CodecError>;

   /// Returns this record's value for the named index, or `None` if the
   /// index does not apply to this record.
   ///
   /// Called both when writing (to populate the index table) and when a
   /// watcher decides whether an incoming notification matches an
   /// `OneIndex` filter.
   fn index_value(&self, index_name: &str) -> Option<String>;
}

/// Encodes a value as canonical JSON, for `Record` implementations that
/// delegate their byte encoding to `serde_json`.
pub fn encode_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
   serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes a value from canonical JSON, for `Record` implementations that
/// delegate their byte decoding to `serde_json`.
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
   serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde::Deserialize;

   #[derive(Debug, Serialize, Deserialize, PartialEq)]
   struct Item {
      id: String,
      owner: String,
   }

   impl Record for Item {
      fn primary_key(&self) -> String {
         self.id.clone()
      }

      fn encode(&self) -> Result<Vec<u8>, CodecError> {
         encode_json(self)
      }

      fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
         decode_json(bytes)
      }

      fn index_value(&self, index_name: &str) -> Option<String> {
         match index_name {
            "owner" => Some(self.owner.clone()),
            _ => None,
         }
      }
   }

   #[test]
   fn round_trips_through_json() {
      let item = Item {
         id: "1".into(),
         owner: "alice".into(),
      };
      let bytes = item.encode().unwrap();
      let decoded = Item::decode(&bytes).unwrap();
      assert_eq!(item, decoded);
   }

   #[test]
   fn index_value_is_none_for_unknown_index() {
      let item = Item {
         id: "1".into(),
         owner: "alice".into(),
      };
      assert_eq!(item.index_value("nonexistent"), None);
      assert_eq!(item.index_value("owner").as_deref(), Some("alice"));
   }
}
