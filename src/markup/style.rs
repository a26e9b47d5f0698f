use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap as _;

use crate::foundation::error::{SketchError, SketchResult};

/// Ordered mapping from CSS property name to value.
///
/// Keys are normalized on insertion: `backgroundColor` and `background-color` name the same
/// property and are stored kebab-case. Inserting an existing key replaces its value in place;
/// new keys are appended.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StyleMap {
    entries: Vec<(String, String)>,
}

impl StyleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from `(key, value)` pairs, later pairs overriding earlier ones.
    pub fn from_pairs<K, V, I>(pairs: I) -> SketchResult<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut out = Self::new();
        for (k, v) in pairs {
            out.insert(k.as_ref(), v.as_ref())?;
        }
        Ok(out)
    }

    /// Parse a declaration block such as `"opacity: 0.5; filter: blur(1px);"`.
    pub fn parse_declarations(block: &str) -> SketchResult<Self> {
        let mut out = Self::new();
        for decl in block.split(';') {
            let decl = decl.trim();
            if decl.is_empty() {
                continue;
            }
            let (key, value) = decl.split_once(':').ok_or_else(|| {
                SketchError::validation(format!("declaration '{decl}' is missing ':'"))
            })?;
            out.insert(key, value)?;
        }
        Ok(out)
    }

    pub fn insert(&mut self, key: &str, value: &str) -> SketchResult<()> {
        let key = normalize_key(key)?;
        let value = validate_value(&key, value)?;
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    /// Look up a property by any accepted spelling of its name.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key).ok()?;
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let key = normalize_key(key).ok()?;
        let pos = self.entries.iter().position(|(k, _)| *k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Insert every entry of `other` in its order; values from `other` win.
    pub fn merge(&mut self, other: &StyleMap) {
        for (k, v) in &other.entries {
            match self.entries.iter_mut().find(|(ek, _)| ek == k) {
                Some((_, ev)) => ev.clone_from(v),
                None => self.entries.push((k.clone(), v.clone())),
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize back into a `key: value;` declaration block.
    pub fn to_declarations(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.entries {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(k);
            out.push_str(": ");
            out.push_str(v);
            out.push(';');
        }
        out
    }
}

impl serde::Serialize for StyleMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> serde::Deserialize<'de> for StyleMap {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StyleVisitor;

        impl<'de> Visitor<'de> for StyleVisitor {
            type Value = StyleMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of CSS property names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<StyleMap, A::Error> {
                let mut out = StyleMap::new();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    out.insert(&k, &v).map_err(serde::de::Error::custom)?;
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(StyleVisitor)
    }
}

/// Normalize a property name to lowercase kebab-case and validate it.
pub fn normalize_key(key: &str) -> SketchResult<String> {
    let key = key.trim();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    let valid = !out.is_empty()
        && !out.starts_with('-')
        && !out.ends_with('-')
        && out
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid {
        return Err(SketchError::validation(format!(
            "invalid style property name '{key}'"
        )));
    }
    Ok(out)
}

fn validate_value(key: &str, value: &str) -> SketchResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SketchError::validation(format!(
            "style property '{key}' has an empty value"
        )));
    }
    if value.contains([';', '<', '>', '"']) {
        return Err(SketchError::validation(format!(
            "style property '{key}' has a forbidden character in '{value}'"
        )));
    }
    Ok(value.to_string())
}

/// A CSS length, either absolute pixels or a percentage of the containing edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Length {
    Px(f64),
    Percent(f64),
}

impl Length {
    pub fn parse(value: &str) -> SketchResult<Self> {
        let v = value.trim();
        let bad = || SketchError::validation(format!("invalid length '{value}'"));
        let (num, ctor): (&str, fn(f64) -> Length) = if let Some(n) = v.strip_suffix("px") {
            (n, Length::Px)
        } else if let Some(n) = v.strip_suffix('%') {
            (n, Length::Percent)
        } else {
            (v, Length::Px)
        };
        let n: f64 = num.trim().parse().map_err(|_| bad())?;
        if !n.is_finite() {
            return Err(bad());
        }
        Ok(ctor(n))
    }

    pub fn resolve(self, basis: f64) -> f64 {
        match self {
            Self::Px(v) => v,
            Self::Percent(p) => basis * p / 100.0,
        }
    }
}
