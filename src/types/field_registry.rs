use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::debug;

use super::hash_string::HashString;
use super::resolvable::Resolvable;
use super::value::{FieldType, Value, ValueKind};

type Getter<T> = Box<dyn Fn(&T) -> Option<Value> + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, Value) + Send + Sync>;
type NestedRead<T> = Box<dyn Fn(&T, &HashString) -> Option<String> + Send + Sync>;
type NestedWrite<T> = Box<dyn Fn(&mut T, &HashString, &str) -> bool + Send + Sync>;
type NestedList<T> = Box<dyn Fn(&T, &str) -> Vec<String> + Send + Sync>;

enum Entry<T> {
    Field {
        kind: ValueKind,
        get: Getter<T>,
        set: Option<Setter<T>>,
    },
    Nested {
        read: NestedRead<T>,
        write: NestedWrite<T>,
        list: NestedList<T>,
        vocabulary: fn() -> Vocabulary,
    },
}

/// Maps names to typed accessors on a host type `T`.
///
/// Replaces reflection: each readable name gets a getter producing a
/// [`Value`], each writable name a setter taking one. A nested registry
/// handles `name.rest` paths by splitting on the first dot.
///
/// # Example
///
/// ```
/// use std::sync::OnceLock;
/// use rulexpr::{FieldRegistry, Fields, NamedFields, RuleSetBuilder};
///
/// #[derive(Default)]
/// struct Track {
///     callsign: String,
///     colour: String,
/// }
///
/// impl NamedFields for Track {
///     fn registry() -> &'static FieldRegistry<Self> {
///         static REGISTRY: OnceLock<FieldRegistry<Track>> = OnceLock::new();
///         REGISTRY.get_or_init(|| {
///             FieldRegistry::new()
///                 .read_only("cs", |t: &Track| t.callsign.clone())
///                 .field("colour", |t: &Track| t.colour.clone(), |t, v| t.colour = v)
///         })
///     }
/// }
///
/// let rules = RuleSetBuilder::new()
///     .rule(|r| r.when("cs=~AUA.*").then("colour=red"))
///     .build()
///     .unwrap();
/// let mut track = Track { callsign: "AUA123".into(), ..Track::default() };
/// assert!(rules.apply(&mut Fields(&mut track)));
/// assert_eq!(track.colour, "red");
/// ```
pub struct FieldRegistry<T> {
    entries: HashMap<String, Entry<T>>,
    order: Vec<String>,
}

impl<T> Default for FieldRegistry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T> fmt::Debug for FieldRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRegistry")
            .field("names", &self.order)
            .finish()
    }
}

impl<T: 'static> FieldRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(mut self, name: &str, entry: Entry<T>) -> Self {
        if self.entries.insert(name.to_owned(), entry).is_none() {
            self.order.push(name.to_owned());
        }
        self
    }

    /// A readable and writable field.
    #[must_use]
    pub fn field<V: FieldType + 'static>(
        self,
        name: &str,
        get: impl Fn(&T) -> V + Send + Sync + 'static,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self {
        self.insert(
            name,
            Entry::Field {
                kind: V::KIND,
                get: Box::new(move |t: &T| Some(get(t).into_value())),
                set: Some(setter(set)),
            },
        )
    }

    /// A field that can be read but not assigned.
    #[must_use]
    pub fn read_only<V: FieldType + 'static>(
        self,
        name: &str,
        get: impl Fn(&T) -> V + Send + Sync + 'static,
    ) -> Self {
        self.insert(
            name,
            Entry::Field {
                kind: V::KIND,
                get: Box::new(move |t: &T| Some(get(t).into_value())),
                set: None,
            },
        )
    }

    /// A field whose getter may report "no value".
    #[must_use]
    pub fn nullable<V: FieldType + 'static>(
        self,
        name: &str,
        get: impl Fn(&T) -> Option<V> + Send + Sync + 'static,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self {
        self.insert(
            name,
            Entry::Field {
                kind: V::KIND,
                get: Box::new(move |t: &T| get(t).map(FieldType::into_value)),
                set: Some(setter(set)),
            },
        )
    }

    /// Resolve `name.rest` through `U`'s own registry.
    #[must_use]
    pub fn nested<U: NamedFields>(
        self,
        name: &str,
        get: fn(&T) -> &U,
        get_mut: fn(&mut T) -> &mut U,
    ) -> Self {
        self.insert(
            name,
            Entry::Nested {
                read: Box::new(move |t: &T, rest: &HashString| U::registry().read(get(t), rest)),
                write: Box::new(move |t: &mut T, rest: &HashString, text: &str| {
                    U::registry().write(get_mut(t), rest, text)
                }),
                list: Box::new(move |t: &T, rest: &str| get(t).list_value(rest)),
                vocabulary: || U::registry().vocabulary(),
            },
        )
    }

    /// Read `lhs` as canonical text. `None` for unknown names and null
    /// fields.
    #[must_use]
    pub fn read(&self, value: &T, lhs: &HashString) -> Option<String> {
        if let Some(Entry::Field { get, .. }) = self.entries.get(lhs.as_str()) {
            return get(value).map(|v| v.to_string());
        }
        let (head, rest) = lhs.split_first_dot()?;
        match self.entries.get(head.as_str())? {
            Entry::Nested { read, .. } => read(value, &rest),
            Entry::Field { .. } => None,
        }
    }

    /// Parse `text` as the field's type and store it. Returns `false` for
    /// unknown or read-only names and for text that does not parse.
    pub fn write(&self, value: &mut T, lhs: &HashString, text: &str) -> bool {
        if let Some(Entry::Field { kind, set, .. }) = self.entries.get(lhs.as_str()) {
            let Some(set) = set else {
                debug!(lhs = %lhs, "field is read-only");
                return false;
            };
            let Some(parsed) = Value::parse_as(*kind, text) else {
                debug!(lhs = %lhs, text, ?kind, "value does not parse as field type");
                return false;
            };
            set(value, parsed);
            return true;
        }
        let Some((head, rest)) = lhs.split_first_dot() else {
            return false;
        };
        match self.entries.get(head.as_str()) {
            Some(Entry::Nested { write, .. }) => write(value, &rest, text),
            _ => false,
        }
    }

    /// List lookup for `head.rest` where `head` is a nested registry.
    fn nested_list(&self, value: &T, lhs: &str) -> Option<Vec<String>> {
        let (head, rest) = lhs.split_once('.')?;
        match self.entries.get(head)? {
            Entry::Nested { list, .. } => Some(list(value, rest)),
            Entry::Field { .. } => None,
        }
    }

    /// Every name this registry understands, in registration order.
    #[must_use]
    pub fn vocabulary(&self) -> Vocabulary {
        let mut vocabulary = Vocabulary::default();
        for name in &self.order {
            match &self.entries[name] {
                Entry::Field { set, .. } => {
                    vocabulary.names.push(name.clone());
                    if set.is_some() {
                        vocabulary.assignable.push(name.clone());
                    }
                }
                Entry::Nested {
                    vocabulary: nested, ..
                } => {
                    let nested = nested();
                    vocabulary
                        .names
                        .extend(nested.names.iter().map(|n| format!("{name}.{n}")));
                    vocabulary
                        .assignable
                        .extend(nested.assignable.iter().map(|n| format!("{name}.{n}")));
                    vocabulary.first_names.push(name.clone());
                    if !nested.assignable.is_empty() {
                        vocabulary.assign_first_names.push(name.clone());
                    }
                    vocabulary.nested.insert(name.clone(), nested);
                }
            }
        }
        vocabulary
    }
}

fn setter<T, V: FieldType + 'static>(set: impl Fn(&mut T, V) + Send + Sync + 'static) -> Setter<T> {
    Box::new(move |t: &mut T, value: Value| {
        if let Some(v) = V::from_value(value) {
            set(t, v);
        }
    })
}

/// Everything a registry can read and assign, for editors and validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    /// Full names accepted on the left of a comparison.
    pub names: Vec<String>,
    /// Heads of dotted names that resolve through a nested registry.
    pub first_names: Vec<String>,
    /// The nested vocabulary behind each first name.
    pub nested: BTreeMap<String, Vocabulary>,
    /// Full names accepted on the left of an assignment.
    pub assignable: Vec<String>,
    /// Heads of dotted names that have assignable fields.
    pub assign_first_names: Vec<String>,
}

impl Vocabulary {
    #[must_use]
    pub fn can_read(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    #[must_use]
    pub fn can_assign(&self, name: &str) -> bool {
        self.assignable.iter().any(|n| n == name)
    }
}

/// A host type with a static [`FieldRegistry`].
pub trait NamedFields: Sized + 'static {
    fn registry() -> &'static FieldRegistry<Self>;

    /// Lists for `@name` for-each sources.
    fn list_value(&self, lhs: &str) -> Vec<String> {
        let _ = lhs;
        Vec::new()
    }
}

/// Adapts a [`NamedFields`] value into a [`Resolvable`].
#[derive(Debug)]
pub struct Fields<'a, T>(pub &'a mut T);

impl<T: NamedFields> Resolvable for Fields<'_, T> {
    fn value_of_lhs(&self, lhs: &HashString) -> Option<String> {
        T::registry().read(self.0, lhs)
    }

    fn assign_value(&mut self, lhs: &HashString, value: &str) -> bool {
        T::registry().write(self.0, lhs, value)
    }

    fn list_value_of_lhs(&self, lhs: &str) -> Vec<String> {
        T::registry()
            .nested_list(self.0, lhs)
            .unwrap_or_else(|| self.0.list_value(lhs))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use super::*;

    #[derive(Debug, Default)]
    struct Route {
        dest: String,
        legs: Vec<String>,
    }

    impl NamedFields for Route {
        fn registry() -> &'static FieldRegistry<Self> {
            static REGISTRY: OnceLock<FieldRegistry<Route>> = OnceLock::new();
            REGISTRY.get_or_init(|| {
                FieldRegistry::new().field("dest", |r: &Route| r.dest.clone(), |r, v| r.dest = v)
            })
        }

        fn list_value(&self, lhs: &str) -> Vec<String> {
            if lhs == "legs" {
                self.legs.clone()
            } else {
                Vec::new()
            }
        }
    }

    #[derive(Debug, Default)]
    struct Flight {
        callsign: String,
        level: i64,
        heavy: bool,
        squawk: Option<i64>,
        route: Route,
    }

    impl NamedFields for Flight {
        fn registry() -> &'static FieldRegistry<Self> {
            static REGISTRY: OnceLock<FieldRegistry<Flight>> = OnceLock::new();
            REGISTRY.get_or_init(|| {
                FieldRegistry::new()
                    .read_only("cs", |f: &Flight| f.callsign.clone())
                    .field("level", |f: &Flight| f.level, |f, v| f.level = v)
                    .field("heavy", |f: &Flight| f.heavy, |f, v| f.heavy = v)
                    .nullable("squawk", |f: &Flight| f.squawk, |f, v| f.squawk = Some(v))
                    .nested("route", |f: &Flight| &f.route, |f: &mut Flight| &mut f.route)
            })
        }
    }

    fn key(s: &str) -> HashString {
        HashString::new(s)
    }

    fn flight() -> Flight {
        Flight {
            callsign: "AUA123".into(),
            level: 300,
            heavy: false,
            squawk: None,
            route: Route {
                dest: "LOWW".into(),
                legs: vec!["A".into(), "B".into()],
            },
        }
    }

    #[test]
    fn reads_typed_fields_as_text() {
        let f = flight();
        let reg = Flight::registry();
        assert_eq!(reg.read(&f, &key("cs")).as_deref(), Some("AUA123"));
        assert_eq!(reg.read(&f, &key("level")).as_deref(), Some("300"));
        assert_eq!(reg.read(&f, &key("heavy")).as_deref(), Some("false"));
        assert_eq!(reg.read(&f, &key("squawk")), None);
        assert_eq!(reg.read(&f, &key("route.dest")).as_deref(), Some("LOWW"));
        assert_eq!(reg.read(&f, &key("nope")), None);
        assert_eq!(reg.read(&f, &key("cs.x")), None);
    }

    #[test]
    fn writes_parse_by_type() {
        let mut f = flight();
        let reg = Flight::registry();
        assert!(reg.write(&mut f, &key("level"), "310"));
        assert_eq!(f.level, 310);
        assert!(!reg.write(&mut f, &key("level"), "high"));
        assert!(reg.write(&mut f, &key("heavy"), "true"));
        assert!(f.heavy);
        assert!(reg.write(&mut f, &key("squawk"), "7000"));
        assert_eq!(f.squawk, Some(7000));
        assert!(reg.write(&mut f, &key("route.dest"), "EDDF"));
        assert_eq!(f.route.dest, "EDDF");
        assert!(!reg.write(&mut f, &key("cs"), "X"));
        assert!(!reg.write(&mut f, &key("unknown"), "X"));
    }

    #[test]
    fn fields_adapter_resolves_and_lists() {
        let mut f = flight();
        let mut fields = Fields(&mut f);
        assert_eq!(fields.value_of_lhs(&key("route.dest")).as_deref(), Some("LOWW"));
        assert_eq!(fields.list_value_of_lhs("route.legs"), ["A", "B"]);
        assert!(fields.list_value_of_lhs("legs").is_empty());
        assert!(fields.assign_value(&key("level"), "100"));
        assert_eq!(f.level, 100);
    }

    #[test]
    fn vocabulary_lists_names() {
        let vocabulary = Flight::registry().vocabulary();
        assert_eq!(
            vocabulary.names,
            ["cs", "level", "heavy", "squawk", "route.dest"]
        );
        assert_eq!(vocabulary.first_names, ["route"]);
        assert_eq!(vocabulary.assign_first_names, ["route"]);
        assert!(vocabulary.can_assign("route.dest"));
        assert!(!vocabulary.can_assign("cs"));
        assert!(vocabulary.can_read("cs"));
        assert_eq!(vocabulary.nested["route"].names, ["dest"]);
    }
}
