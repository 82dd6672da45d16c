//! # Desired Object Set
//!
//! The child objects a component wants applied in this pass, keyed by [`ObjectKey`].
//! Keys are unique; inserting a second object under an existing key is refused
//! rather than silently replacing the first.

use crate::controller::store::ObjectKey;
use kube::api::DynamicObject;
use std::collections::btree_map::{self, BTreeMap};

#[derive(Debug, Clone, Default)]
pub struct DesiredObjectSet {
    objects: BTreeMap<ObjectKey, DynamicObject>,
}

impl DesiredObjectSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object; returns the key back if it is already taken
    pub fn insert(&mut self, key: ObjectKey, obj: DynamicObject) -> Result<(), ObjectKey> {
        match self.objects.entry(key) {
            btree_map::Entry::Occupied(entry) => Err(entry.key().clone()),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(obj);
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&DynamicObject> {
        self.objects.get(key)
    }

    pub fn contains_key(&self, key: &ObjectKey) -> bool {
        self.objects.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ObjectKey> {
        self.objects.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectKey, &DynamicObject)> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ObjectKey, &mut DynamicObject)> {
        self.objects.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
