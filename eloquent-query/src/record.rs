//! Rows materialized from the database and the collections holding them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::engine::Row;
use crate::value::{Key, Value};

static NEXT_CID: AtomicU64 = AtomicU64::new(1);

fn next_cid() -> String {
    format!("c{}", NEXT_CID.fetch_add(1, Ordering::Relaxed))
}

/// A related value attached to a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// One-to-one relation; `None` when no row matched.
    One(Option<Box<Record>>),
    /// One-to-many or many-to-many relation.
    Many(Collection),
}

/// A single row with its loaded relations.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    cid: String,
    attributes: IndexMap<String, Value>,
    relations: IndexMap<String, Related>,
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl Record {
    /// An empty record with a fresh client id.
    pub fn new() -> Self {
        Self {
            cid: next_cid(),
            attributes: IndexMap::new(),
            relations: IndexMap::new(),
        }
    }

    /// Build from a database row.
    pub fn from_row(row: Row) -> Self {
        Self {
            cid: next_cid(),
            attributes: row,
            relations: IndexMap::new(),
        }
    }

    /// Build from `(column, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut record = Self::new();
        for (column, value) in pairs {
            record.attributes.insert(column.into(), value.into());
        }
        record
    }

    /// Client id, unique within the process.
    pub fn cid(&self) -> &str {
        &self.cid
    }

    /// Attribute value, if the column is present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    /// Set an attribute.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(column.into(), value.into());
        self
    }

    /// True when the column is present and not null.
    pub fn has(&self, column: &str) -> bool {
        self.attributes.get(column).is_some_and(|v| !v.is_null())
    }

    /// All attributes in column order.
    pub fn attributes(&self) -> &IndexMap<String, Value> {
        &self.attributes
    }

    /// Loaded relation by alias.
    pub fn relation(&self, alias: &str) -> Option<&Related> {
        self.relations.get(alias)
    }

    /// Loaded to-many relation by alias.
    pub fn many(&self, alias: &str) -> Option<&Collection> {
        match self.relations.get(alias) {
            Some(Related::Many(collection)) => Some(collection),
            _ => None,
        }
    }

    /// Loaded to-one relation by alias; `None` when unloaded or unmatched.
    pub fn one(&self, alias: &str) -> Option<&Record> {
        match self.relations.get(alias) {
            Some(Related::One(record)) => record.as_deref(),
            _ => None,
        }
    }

    /// Attach a relation.
    pub fn set_relation(&mut self, alias: impl Into<String>, related: Related) {
        self.relations.insert(alias.into(), related);
    }

    /// All loaded relations.
    pub fn relations(&self) -> &IndexMap<String, Related> {
        &self.relations
    }

    /// Attributes plus nested relations as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (column, value) in &self.attributes {
            object.insert(column.clone(), value.to_json());
        }
        for (alias, related) in &self.relations {
            let json = match related {
                Related::One(Some(record)) => record.to_json(),
                Related::One(None) => serde_json::Value::Null,
                Related::Many(collection) => collection.to_json(),
            };
            object.insert(alias.clone(), json);
        }
        serde_json::Value::Object(object)
    }
}

/// Ordered records with id and client-id lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    id_attribute: String,
    records: Vec<Record>,
    by_id: HashMap<Key, usize>,
    by_cid: HashMap<String, usize>,
}

impl Collection {
    /// An empty collection whose ids live in `id_attribute`.
    pub fn new(id_attribute: impl Into<String>) -> Self {
        Self {
            id_attribute: id_attribute.into(),
            records: Vec::new(),
            by_id: HashMap::new(),
            by_cid: HashMap::new(),
        }
    }

    /// Collect records, building both lookups.
    pub fn from_records(id_attribute: impl Into<String>, records: Vec<Record>) -> Self {
        let mut collection = Self::new(id_attribute);
        collection.records = records;
        collection.reindex();
        collection
    }

    /// Id column of the records.
    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    /// Append a record.
    pub fn push(&mut self, record: Record) -> &mut Record {
        let index = self.records.len();
        if let Some(key) = record.get(&self.id_attribute).and_then(Value::key) {
            self.by_id.insert(key, index);
        }
        self.by_cid.insert(record.cid.clone(), index);
        self.records.push(record);
        &mut self.records[index]
    }

    /// Add a record unless one with equal values in `unique_keys` was already
    /// added; returns the record held by the collection either way.
    pub fn add_memo(&mut self, record: Record, unique_keys: &[&str]) -> &mut Record {
        let probe: Vec<Option<Key>> = unique_keys
            .iter()
            .map(|column| record.get(column).and_then(Value::key))
            .collect();
        let existing = self.records.iter().position(|candidate| {
            unique_keys
                .iter()
                .zip(&probe)
                .all(|(column, key)| candidate.get(column).and_then(Value::key) == *key)
        });
        match existing {
            Some(index) => &mut self.records[index],
            None => self.push(record),
        }
    }

    /// Rebuild the lookups after records were mutated in place.
    pub fn reindex(&mut self) {
        self.by_id.clear();
        self.by_cid.clear();
        for (index, record) in self.records.iter().enumerate() {
            if let Some(key) = record.get(&self.id_attribute).and_then(Value::key) {
                self.by_id.insert(key, index);
            }
            self.by_cid.insert(record.cid.clone(), index);
        }
    }

    /// Record by id.
    pub fn get_by_id(&self, id: impl Into<Value>) -> Option<&Record> {
        let key = id.into().key()?;
        self.by_id.get(&key).map(|&index| &self.records[index])
    }

    /// Record by client id.
    pub fn get_by_cid(&self, cid: &str) -> Option<&Record> {
        self.by_cid.get(cid).map(|&index| &self.records[index])
    }

    /// Whether a record with this id is present.
    pub fn contains_id(&self, id: impl Into<Value>) -> bool {
        id.into().key().is_some_and(|key| self.by_id.contains_key(&key))
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Records as a slice.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Mutable records. Call [`Collection::reindex`] after changing ids.
    pub fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    /// Take the records out.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// JSON array of the records.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.records.iter().map(Record::to_json).collect())
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cids_are_unique() {
        let a = Record::new();
        let b = Record::new();
        assert_ne!(a.cid(), b.cid());
    }

    #[test]
    fn test_lookups_and_reindex() {
        let mut collection = Collection::new("idAttr");
        collection.push(Record::from_pairs([("idAttr", 5), ("n", 1)]));
        let cid = collection.push(Record::from_pairs([("n", 2)])).cid().to_string();

        assert!(collection.contains_id(5));
        assert!(!collection.contains_id(6));
        assert!(collection.get_by_cid(&cid).is_some());

        collection.records_mut()[1].set("idAttr", 6);
        assert!(!collection.contains_id(6));
        collection.reindex();
        assert_eq!(collection.get_by_id(6).and_then(|r| r.get("n")), Some(&Value::Int(2)));
    }

    #[test]
    fn test_add_memo_returns_existing() {
        let mut collection = Collection::new("id");
        let first = collection
            .add_memo(Record::from_pairs([("name", "red")]), &["name"])
            .cid()
            .to_string();
        let second = collection
            .add_memo(Record::from_pairs([("name", "red")]), &["name"])
            .cid()
            .to_string();
        collection.add_memo(Record::from_pairs([("name", "blue")]), &["name"]);

        assert_eq!(first, second);
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn test_to_json_nests_relations() {
        let mut user = Record::from_pairs([("id", 1)]);
        user.set_relation("roles", Related::Many(Collection::new("id")));
        user.set_relation("manager", Related::One(None));

        let json = user.to_json();
        assert_eq!(json["id"], 1);
        assert_eq!(json["roles"], serde_json::json!([]));
        assert!(json["manager"].is_null());
    }
}
