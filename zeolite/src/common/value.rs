use im::OrdMap;
use std::fmt::{Debug, Display, Formatter};

/// Represents a value inside a document's properties tree. It can be a
/// simple scalar like [Value::I64] or [Value::String], binary data, or a
/// complex value like [Value::Dict] or [Value::Array].
///
/// # Usage
///
/// Create values using the `From` trait, the `val!` macro, or the `props!`
/// macro for whole trees:
/// ```ignore
/// let v1: Value = 42i64.into();
/// let v2 = val!("hello");
/// let props = props! { greeting: "Howdy!", count: 3 };
/// ```
#[derive(Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    /// Binary data; stored opaquely
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// A nested properties tree
    Dict(Properties),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(f) => Some(*f),
            Value::I64(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Properties> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::I64(i) => write!(f, "{}", i),
            Value::F64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Array(a) => f.debug_list().entries(a.iter()).finish(),
            Value::Dict(d) => Debug::fmt(d, f),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::I64(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::I64(i)
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Value::I64(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::F64(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<Properties> for Value {
    fn from(p: Properties) -> Self {
        Value::Dict(p)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        match o {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// A document's properties tree, backed by a persistent ordered map.
///
/// ## Copy-on-write design
///
/// `Properties` uses `im::OrdMap`, a persistent map with structural sharing:
/// - cloning is O(1) (the clone shares the entire tree with the original)
/// - writing a key rebuilds only the path from that node to the root,
///   leaving sibling sub-trees shared with the base
///
/// This is exactly the overlay behavior a mutable document handle needs:
/// reading an unmodified sub-tree returns the base's value, while a write
/// materializes a private copy of the touched path only.
///
/// A `Properties` value itself is not synchronized; concurrent mutation of
/// one instance requires external synchronization (document handles provide
/// it). Shared *reads* of a clone are always safe.
#[derive(Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Properties {
    data: OrdMap<String, Value>,
}

impl Properties {
    /// Creates an empty properties tree.
    pub fn new() -> Self {
        Properties { data: OrdMap::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Associates `value` with `key`, replacing any previous value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data = self.data.update(key.into(), value.into());
    }

    /// Returns the value for `key`, or `None` if absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Removes `key`; returns true if it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let (data, removed) = self.data.extract(key).map_or_else(
            || (self.data.clone(), false),
            |(_, rest)| (rest, true),
        );
        self.data = data;
        removed
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Iterates over key-value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }
}

impl Debug for Properties {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.data.iter()).finish()
    }
}

impl Display for Properties {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl FromIterator<(String, Value)> for Properties {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Properties {
            data: iter.into_iter().collect(),
        }
    }
}

/// Converts an expression into a [Value].
#[macro_export]
macro_rules! val {
    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}

/// Builds a [Properties] tree from key-value pairs. Nested braces build
/// nested dictionaries, brackets build arrays.
///
/// ```ignore
/// let props = props! {
///     greeting: "Howdy!",
///     profile: {
///         name: "bob",
///         tags: ["admin", "user"],
///     },
/// };
/// ```
#[macro_export]
macro_rules! props {
    () => {
        $crate::common::Properties::new()
    };

    ($($key:tt : $value:tt),* $(,)?) => {
        {
            #[allow(unused_imports)]
            use $crate::props_value;

            let mut props = $crate::common::Properties::new();
            $(
                props.put(stringify!($key), $crate::props_value!($value));
            )*
            props
        }
    };
}

/// Helper macro to convert values for the props! macro.
#[macro_export]
macro_rules! props_value {
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::common::Value::Dict($crate::props! { $($key : $value),* })
    };

    ([ $($value:tt),* $(,)? ]) => {
        $crate::common::Value::Array(vec![$($crate::props_value!($value)),*])
    };

    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}
