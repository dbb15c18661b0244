use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

use crate::core::types::DocInfo;

/// Key kinds a table may declare. Every table in this engine keys on
/// 32-hex-char digests, so only strings exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Str,
}

/// The closed set of value encodings a table may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Str,
    StrList,
    F64,
    MapU32,
    MapF64,
    MapU32List,
    MapF32List,
    DocInfo,
}

/// Marker tying a concrete Rust type to its declared on-disk kind. A typed
/// table view can only be opened for types in this set; the manifest check in
/// `Table::open` catches a view whose declared kind disagrees with what the
/// directory was created with.
pub trait TableValue: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: ValueKind;
}

impl TableValue for String {
    const KIND: ValueKind = ValueKind::Str;
}

impl TableValue for Vec<String> {
    const KIND: ValueKind = ValueKind::StrList;
}

impl TableValue for f64 {
    const KIND: ValueKind = ValueKind::F64;
}

impl TableValue for HashMap<String, u32> {
    const KIND: ValueKind = ValueKind::MapU32;
}

impl TableValue for HashMap<String, f64> {
    const KIND: ValueKind = ValueKind::MapF64;
}

impl TableValue for HashMap<String, Vec<u32>> {
    const KIND: ValueKind = ValueKind::MapU32List;
}

impl TableValue for HashMap<String, Vec<f32>> {
    const KIND: ValueKind = ValueKind::MapF32List;
}

impl TableValue for DocInfo {
    const KIND: ValueKind = ValueKind::DocInfo;
}

/// Per-table manifest persisted as `schema.json` next to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub key: KeyKind,
    pub value: ValueKind,
}
