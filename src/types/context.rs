use std::collections::HashMap;

use super::hash_string::HashString;
use super::resolvable::Resolvable;
use super::Value;

/// A map-backed [`Resolvable`] keyed by dot-separated paths.
///
/// Supports nested paths like `"flight.route.dest"`. Leaves keep their
/// [`Value`] type: assigning text to an existing leaf must parse as that
/// leaf's kind, a new path is stored as a string. Lists feed `@name` for-each
/// sources.
#[derive(Debug, Clone, Default)]
pub struct Context {
    data: HashMap<String, ContextValue>,
    lists: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
enum ContextValue {
    Leaf(Value),
    Nested(HashMap<String, ContextValue>),
}

impl Context {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value at a dot-separated path. Creates intermediate nested maps as needed.
    #[must_use]
    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.insert(path, value.into());
        self
    }

    /// Set the list returned for `path` by [`Resolvable::list_value_of_lhs`].
    #[must_use]
    pub fn set_list<I, S>(mut self, path: &str, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_list(path, items);
        self
    }

    /// Insert a value at a dot-separated path (mutable reference version).
    pub fn insert(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        Self::insert_recursive(&mut self.data, &segments, value);
    }

    pub fn insert_list<I, S>(&mut self, path: &str, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lists
            .insert(path.to_owned(), items.into_iter().map(Into::into).collect());
    }

    /// Look up a value by dot-separated path.
    /// Returns `None` if the path does not exist or points to a nested map.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments: Vec<&str> = path.split('.').collect();
        Self::get_recursive(&self.data, &segments)
    }

    #[must_use]
    pub fn list(&self, path: &str) -> Option<&[String]> {
        self.lists.get(path).map(Vec::as_slice)
    }

    fn insert_recursive(map: &mut HashMap<String, ContextValue>, segments: &[&str], value: Value) {
        match segments {
            [] => {}
            [last] => {
                map.insert((*last).to_owned(), ContextValue::Leaf(value));
            }
            [first, rest @ ..] => {
                let entry = map
                    .entry((*first).to_owned())
                    .or_insert_with(|| ContextValue::Nested(HashMap::new()));
                match entry {
                    ContextValue::Nested(nested) => {
                        Self::insert_recursive(nested, rest, value);
                    }
                    ContextValue::Leaf(_) => {
                        let mut nested = HashMap::new();
                        Self::insert_recursive(&mut nested, rest, value);
                        *entry = ContextValue::Nested(nested);
                    }
                }
            }
        }
    }

    fn get_recursive<'a>(
        map: &'a HashMap<String, ContextValue>,
        segments: &[&str],
    ) -> Option<&'a Value> {
        match segments {
            [] => None,
            [last] => match map.get(*last)? {
                ContextValue::Leaf(v) => Some(v),
                ContextValue::Nested(_) => None,
            },
            [first, rest @ ..] => match map.get(*first)? {
                ContextValue::Nested(nested) => Self::get_recursive(nested, rest),
                ContextValue::Leaf(_) => None,
            },
        }
    }
}

impl Resolvable for Context {
    fn value_of_lhs(&self, lhs: &HashString) -> Option<String> {
        self.get(lhs.as_str()).map(ToString::to_string)
    }

    fn assign_value(&mut self, lhs: &HashString, value: &str) -> bool {
        let parsed = match self.get(lhs.as_str()) {
            Some(existing) => Value::parse_as(existing.kind(), value),
            None => Some(Value::String(value.to_owned())),
        };
        match parsed {
            Some(v) => {
                self.insert(lhs.as_str(), v);
                true
            }
            None => false,
        }
    }

    fn list_value_of_lhs(&self, lhs: &str) -> Vec<String> {
        self.lists.get(lhs).cloned().unwrap_or_default()
    }
}
