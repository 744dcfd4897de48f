//! On-disk document format
//!
//! A preferences file is a single JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "a": { "type": "string", "value": "1" },
//!     "b": { "type": "int", "value": 2 }
//!   }
//! }
//! ```
//!
//! Entries are written sorted by key so identical maps produce identical
//! bytes.

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};

use super::error::{Result, StoreError};
use crate::domain::{PrefMap, PrefValue};

/// Current document format version
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct DocumentRef<'a> {
    version: u32,
    entries: BTreeMap<&'a str, &'a PrefValue>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    version: u32,
    entries: BTreeMap<String, PrefValue>,
}

/// Serializes `map` into `writer`
pub fn write_map<W: Write>(map: &PrefMap, writer: W) -> Result<()> {
    let entries = map.iter().map(|(key, value)| (key.as_str(), value)).collect();

    let doc = DocumentRef {
        version: FORMAT_VERSION,
        entries,
    };

    serde_json::to_writer_pretty(writer, &doc).map_err(|e| StoreError::Serialize(e.to_string()))
}

/// Encodes `map` to bytes
pub fn encode(map: &PrefMap) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_map(map, &mut buf)?;
    Ok(buf)
}

/// Decodes a document. Any structural problem is a parse error.
pub fn decode(bytes: &[u8]) -> Result<PrefMap> {
    let doc: Document =
        serde_json::from_slice(bytes).map_err(|e| StoreError::Parse(e.to_string()))?;

    if doc.version > FORMAT_VERSION {
        return Err(StoreError::Parse(format!(
            "unsupported format version {}",
            doc.version
        )));
    }

    Ok(doc.entries.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample() -> PrefMap {
        let mut map = PrefMap::new();
        map.insert("a".into(), PrefValue::String("1".into()));
        map.insert("b".into(), PrefValue::Int(2));
        map.insert("c".into(), PrefValue::Long(i64::MAX));
        map.insert("d".into(), PrefValue::Float(0.5));
        map.insert("e".into(), PrefValue::Bool(false));
        map.insert(
            "f".into(),
            PrefValue::StringSet(["x", "y"].iter().map(|s| s.to_string()).collect::<BTreeSet<_>>()),
        );
        map
    }

    #[test]
    fn decode_reads_back_every_kind() {
        let map = sample();
        let decoded = decode(&encode(&map).unwrap()).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn output_is_deterministic() {
        let map = sample();
        assert_eq!(encode(&map).unwrap(), encode(&map.clone()).unwrap());

        let text = String::from_utf8(encode(&map).unwrap()).unwrap();
        let a = text.find("\"a\"").unwrap();
        let f = text.find("\"f\"").unwrap();
        assert!(a < f);
    }

    #[test]
    fn empty_map_is_valid() {
        let bytes = encode(&PrefMap::new()).unwrap();
        assert!(decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode(b"not json"), Err(StoreError::Parse(_))));
        assert!(matches!(decode(b""), Err(StoreError::Parse(_))));
        assert!(matches!(
            decode(br#"{"version": 1}"#),
            Err(StoreError::Parse(_))
        ));
    }

    #[test]
    fn rejects_unknown_type_tag() {
        let doc = br#"{"version": 1, "entries": {"k": {"type": "map", "value": {}}}}"#;
        assert!(matches!(decode(doc), Err(StoreError::Parse(_))));
    }

    #[test]
    fn rejects_newer_version() {
        let doc = br#"{"version": 99, "entries": {}}"#;
        assert!(matches!(decode(doc), Err(StoreError::Parse(_))));
    }

    #[test]
    fn non_finite_floats_survive_the_file() {
        let mut map = PrefMap::new();
        map.insert("nan".into(), PrefValue::Float(f32::NAN));
        map.insert("up".into(), PrefValue::Float(f32::INFINITY));
        map.insert("down".into(), PrefValue::Float(f32::NEG_INFINITY));

        let bytes = encode(&map).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"NaN\""));
        assert!(text.contains("\"-Infinity\""));
        assert_eq!(decode(&bytes).unwrap(), map);
    }
}
