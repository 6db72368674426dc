//! The secondary-index store: per table, a map from index name to a nested
//! key tree whose depth equals the index arity. Unique indexes end in a
//! single row-id leaf; non-unique indexes end in a set of row-ids. Missing
//! field values are encoded by the `__NULL__` sentinel key.
//!
//! A single-column PRIMARY index is never materialized here — the dataset
//! key *is* that value.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use smallvec::SmallVec;
use sqlfake_lib::row::{Row, RowKey};
use sqlfake_lib::schema::IndexDef;

/// A key path through one index: one component per indexed field.
pub type KeyPath = SmallVec<[RowKey; 2]>;

/// One level of an index tree: field value to the next level down.
pub type KeyMap = IndexMap<RowKey, IndexNode>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexNode {
    /// Unique leaf: the one row holding this key.
    Leaf(RowKey),
    /// Non-unique leaf: every row holding this key.
    Set(BTreeSet<RowKey>),
    Branch(KeyMap),
}

/// All secondary indexes of one table, by index name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRefs {
    indexes: IndexMap<String, KeyMap>,
}

impl IndexRefs {
    pub fn new() -> Self {
        IndexRefs::default()
    }

    pub fn index(&self, name: &str) -> Option<&KeyMap> {
        self.indexes.get(name)
    }

    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    pub fn add(&mut self, index: &str, path: &[RowKey], unique: bool, row_id: RowKey) {
        let map = self.indexes.entry(index.to_owned()).or_default();
        add_entry(map, path, unique, row_id);
    }

    pub fn remove(&mut self, index: &str, path: &[RowKey], unique: bool, row_id: &RowKey) {
        if let Some(map) = self.indexes.get_mut(index) {
            remove_entry(map, path, unique, row_id);
        }
    }

    /// Walks `path` and returns the unique leaf it ends at, if any. Used by
    /// the uniqueness pre-check in the SET core.
    pub fn unique_leaf(&self, index: &str, path: &[RowKey]) -> Option<&RowKey> {
        let mut map = self.index(index)?;
        let (last, prefix) = path.split_last()?;
        for component in prefix {
            match map.get(component)? {
                IndexNode::Branch(child) => map = child,
                _ => return None,
            }
        }
        match map.get(last)? {
            IndexNode::Leaf(row_id) => Some(row_id),
            _ => None,
        }
    }

    /// Every row-id reachable from the given key prefix, in tree order. An
    /// empty prefix yields the whole index.
    pub fn rows_at(&self, index: &str, prefix: &[RowKey]) -> Vec<RowKey> {
        let mut out = Vec::new();
        let Some(mut map) = self.index(index) else {
            return out;
        };
        let mut components = prefix.iter().peekable();
        while let Some(component) = components.next() {
            match map.get(component) {
                Some(IndexNode::Branch(child)) => map = child,
                Some(IndexNode::Leaf(row_id)) => {
                    if components.peek().is_none() {
                        out.push(row_id.clone());
                    }
                    return out;
                }
                Some(IndexNode::Set(set)) => {
                    if components.peek().is_none() {
                        out.extend(set.iter().cloned());
                    }
                    return out;
                }
                None => return out,
            }
        }
        collect_rows(map, &mut out);
        out
    }

    /// Every row-id stored anywhere in the named index.
    pub fn row_ids(&self, index: &str) -> Vec<RowKey> {
        self.rows_at(index, &[])
    }
}

fn collect_rows(map: &KeyMap, out: &mut Vec<RowKey>) {
    for node in map.values() {
        match node {
            IndexNode::Leaf(row_id) => out.push(row_id.clone()),
            IndexNode::Set(set) => out.extend(set.iter().cloned()),
            IndexNode::Branch(child) => collect_rows(child, out),
        }
    }
}

fn add_entry(map: &mut KeyMap, path: &[RowKey], unique: bool, row_id: RowKey) {
    match path {
        [] => {}
        [last] if unique => {
            map.insert(last.clone(), IndexNode::Leaf(row_id));
        }
        [last] => {
            let node = map
                .entry(last.clone())
                .or_insert_with(|| IndexNode::Set(BTreeSet::new()));
            if let IndexNode::Set(set) = node {
                set.insert(row_id);
            }
        }
        [head, tail @ ..] => {
            let node = map
                .entry(head.clone())
                .or_insert_with(|| IndexNode::Branch(KeyMap::new()));
            if let IndexNode::Branch(child) = node {
                add_entry(child, tail, unique, row_id);
            }
        }
    }
}

fn remove_entry(map: &mut KeyMap, path: &[RowKey], unique: bool, row_id: &RowKey) {
    match path {
        [] => {}
        [last] if unique => {
            map.shift_remove(last);
        }
        [last] => {
            if let Some(IndexNode::Set(set)) = map.get_mut(last) {
                set.remove(row_id);
                if set.is_empty() {
                    map.shift_remove(last);
                }
            }
        }
        [head, tail @ ..] => {
            if let Some(IndexNode::Branch(child)) = map.get_mut(head) {
                remove_entry(child, tail, unique, row_id);
                // Branch collapse: a subtree with no entries left disappears.
                if child.is_empty() {
                    map.shift_remove(head);
                }
            }
        }
    }
}

/// An index as one mutation sees it: name, fields, and whether its entries
/// are structurally unique. The Vitess sharding pseudo-index forces
/// `unique` on regardless of kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicableIndex {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
    pub primary_single: bool,
}

impl ApplicableIndex {
    pub fn from_def(def: &IndexDef) -> Self {
        ApplicableIndex {
            name: def.name.clone(),
            fields: def.fields.clone(),
            unique: def.is_unique(),
            primary_single: def.is_primary_single(),
        }
    }

    pub fn sharding(keyspace: &str, sharding_key: &str) -> Self {
        ApplicableIndex {
            name: keyspace.to_owned(),
            fields: vec![sharding_key.to_owned()],
            unique: true,
            primary_single: false,
        }
    }
}

/// One index entry a row occupies: index name, key path, and whether the
/// leaf is stored unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKeyEntry {
    pub index: String,
    pub path: KeyPath,
    pub store_as_unique: bool,
}

/// Computes the index entries `row` occupies, one per applicable index.
///
/// Single-column PRIMARY indexes never materialize. Single-field indexes
/// key by the field value, with NULL at the sentinel. Multi-field indexes
/// walk the fields in order, with two corrections for NULLs: a NULL in the
/// *first* field skips the index entirely (sparse null semantics), while a
/// NULL in any later field contributes the sentinel and degrades the entry
/// to non-unique.
pub fn compute_index_keys(indexes: &[ApplicableIndex], row: &Row) -> Vec<IndexKeyEntry> {
    let mut entries = Vec::with_capacity(indexes.len());
    'indexes: for index in indexes {
        if index.primary_single {
            continue;
        }
        let mut store_as_unique = index.unique;
        let mut path = KeyPath::new();
        if let [field] = index.fields.as_slice() {
            path.push(key_component(row, field));
        } else {
            for (position, field) in index.fields.iter().enumerate() {
                match row.get(field).filter(|v| !v.is_null()) {
                    Some(value) => path.push(RowKey::from(value)),
                    None if position == 0 => continue 'indexes,
                    None => {
                        store_as_unique = false;
                        path.push(RowKey::null_sentinel());
                    }
                }
            }
        }
        entries.push(IndexKeyEntry {
            index: index.name.clone(),
            path,
            store_as_unique,
        });
    }
    entries
}

fn key_component(row: &Row, field: &str) -> RowKey {
    match row.get(field).filter(|v| !v.is_null()) {
        Some(value) => RowKey::from(value),
        None => RowKey::null_sentinel(),
    }
}
