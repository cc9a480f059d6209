//! The `feature` proxy object's host-side state: per-feature cached
//! property lookups plus a length-classed string interning arena, so that
//! repeated property reads across several style functions don't reallocate.

use std::rc::Rc;

use crate::value::{Properties, Value};

const SMALL_CLASS: usize = 8;
const MEDIUM_CLASS: usize = 32;
const LARGE_CLASS: usize = 128;

fn length_class(len: usize) -> usize {
    if len <= SMALL_CLASS {
        SMALL_CLASS
    } else if len <= MEDIUM_CLASS {
        MEDIUM_CLASS
    } else {
        LARGE_CLASS
    }
}

/// Reference-counted interned strings, bucketed by length class. A slot is
/// reused across features whenever the incoming string's bytes match, so
/// two features reporting the same `class` value share one allocation.
#[derive(Default)]
struct InternArena {
    slots: std::collections::HashMap<usize, Vec<Rc<str>>>,
}

impl InternArena {
    fn intern(&mut self, s: &str) -> Rc<str> {
        let class = length_class(s.len());
        let bucket = self.slots.entry(class).or_default();
        if let Some(existing) = bucket.iter().find(|r| r.as_ref() == s) {
            return existing.clone();
        }
        let rc: Rc<str> = Rc::from(s);
        bucket.push(rc.clone());
        rc
    }
}

/// Host-side proxy backing the JS `feature` global. `get`/`has` mirror the
/// two traps the embedded engine's proxy must support.
pub struct FeatureProxy {
    props: Properties,
    cache: std::collections::HashMap<String, Option<Value>>,
    arena: InternArena,
}

impl FeatureProxy {
    pub fn new() -> Self {
        FeatureProxy {
            props: Properties::new(),
            cache: std::collections::HashMap::new(),
            arena: InternArena::default(),
        }
    }

    /// Points the proxy at a new feature, clearing the per-feature cache.
    /// The interning arena is retained across features deliberately.
    pub fn set_feature(&mut self, props: Properties) {
        self.props = props;
        self.cache.clear();
    }

    pub fn has(&self, key: &str) -> bool {
        self.props.contains(key)
    }

    /// Resolves `key`, caching the pointer-equivalent (the `Value`) so a
    /// repeated lookup for the same key within this feature is free, and
    /// interning returned strings into the shared arena.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        if let Some(cached) = self.cache.get(key) {
            return cached.clone();
        }
        let resolved = self.props.get(key).map(|v| match v {
            Value::String(s) => Value::String(self.arena.intern(s)),
            other => other.clone(),
        });
        self.cache.insert(key.to_string(), resolved.clone());
        resolved
    }
}

impl Default for FeatureProxy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_lookups_are_cached_and_cleared_between_features() {
        let mut proxy = FeatureProxy::new();
        let mut props = Properties::new();
        props.set("name", Value::from("river"));
        proxy.set_feature(props);

        assert_eq!(proxy.get("name"), Some(Value::from("river")));
        assert_eq!(proxy.get("name"), Some(Value::from("river")));
        assert!(proxy.has("name"));
        assert!(!proxy.has("missing"));

        let mut next_props = Properties::new();
        next_props.set("name", Value::from("road"));
        proxy.set_feature(next_props);
        assert_eq!(proxy.get("name"), Some(Value::from("road")));
    }

    #[test]
    fn interned_strings_with_equal_bytes_share_allocation() {
        let mut arena = InternArena::default();
        let a = arena.intern("waterway");
        let b = arena.intern("waterway");
        assert!(Rc::ptr_eq(&a, &b));
    }
}
