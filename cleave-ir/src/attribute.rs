use cleave_utils::Id;
use linked_hash_map::LinkedHashMap;

/// The value carried by an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// A unit attribute: its presence is the information.
    Unit,
    /// A scalar number. For a `constant` op this encodes a splat value.
    Num(i64),
    /// An interned string, e.g. a device tag or a callee symbol.
    Str(Id),
    /// A dense list of numbers. For a `constant` op this encodes a
    /// non-splat tensor literal.
    NumList(Vec<i64>),
}

/// Attributes associated with a specific IR node.
///
/// Keys are open-ended: passes are configured with the attribute keys they
/// care about (e.g. which key carries the device placement), so unlike a
/// closed attribute enum, anything can be attached here.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    attrs: LinkedHashMap<Id, AttrValue>,
}

impl Attributes {
    /// Add a new attribute, replacing any previous value for the key.
    pub fn insert<K: Into<Id>>(&mut self, key: K, val: AttrValue) {
        self.attrs.insert(key.into(), val);
    }

    /// Get the value associated with an attribute key.
    pub fn get<K: Into<Id>>(&self, key: K) -> Option<&AttrValue> {
        self.attrs.get(&key.into())
    }

    /// Get the value for `key` if it is a string attribute.
    pub fn get_str<K: Into<Id>>(&self, key: K) -> Option<Id> {
        match self.attrs.get(&key.into()) {
            Some(AttrValue::Str(s)) => Some(*s),
            _ => None,
        }
    }

    /// Check if an attribute key has been set.
    pub fn has<K: Into<Id>>(&self, key: K) -> bool {
        self.attrs.contains_key(&key.into())
    }

    /// Returns true if there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Remove the attribute with the name `key`.
    pub fn remove<K: Into<Id>>(&mut self, key: K) {
        self.attrs.remove(&key.into());
    }

    /// Iterate over the attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Id, &AttrValue)> {
        self.attrs.iter()
    }

    /// Render the attributes with a separator and a per-entry formatter.
    pub fn to_string_with<F>(&self, sep: &'static str, fmt: F) -> String
    where
        F: Fn(Id, &AttrValue) -> String,
    {
        if self.is_empty() {
            return String::default();
        }
        self.attrs
            .iter()
            .map(|(k, v)| fmt(*k, v))
            .collect::<Vec<_>>()
            .join(sep)
    }
}

impl<K: Into<Id>> FromIterator<(K, AttrValue)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, AttrValue)>>(iter: T) -> Self {
        let mut attrs = Attributes::default();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}
