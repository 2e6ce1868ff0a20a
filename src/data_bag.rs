// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use std::collections::{btree_map, BTreeMap};

/// Immutable, name-ordered holder of the validated descriptors of one category.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBag<D> {
    entries: BTreeMap<String, D>,
}

impl<D> DataBag<D> {
    pub fn get(&self, name: &str) -> Option<&D> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, D> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<D> FromIterator<(String, D)> for DataBag<D> {
    fn from_iter<I: IntoIterator<Item = (String, D)>>(iter: I) -> Self {
        DataBag {
            entries: iter.into_iter().collect(),
        }
    }
}
