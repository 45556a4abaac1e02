use std::collections::BTreeMap;

/// A query-string value: plain, or a bracket-notation map (`price[gte]=10`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Scalar(String),
    Nested(BTreeMap<String, String>),
}

/// Query-string pairs folded into a key -> value mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, ParamValue>);

impl QueryParams {
    /// Later pairs win over earlier ones for the same key.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map: BTreeMap<String, ParamValue> = BTreeMap::new();
        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            match split_bracket(&key) {
                Some((base, op)) => {
                    let entry = map
                        .entry(base.to_string())
                        .or_insert_with(|| ParamValue::Nested(BTreeMap::new()));
                    match entry {
                        ParamValue::Nested(ops) => {
                            ops.insert(op.to_string(), value);
                        }
                        scalar => {
                            *scalar = ParamValue::Nested(BTreeMap::from([(op.to_string(), value)]));
                        }
                    }
                }
                None => {
                    map.insert(key, ParamValue::Scalar(value));
                }
            }
        }
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Non-empty scalar value for `key`.
    pub fn scalar(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(ParamValue::Scalar(v)) if !v.is_empty() => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }
}

fn split_bracket(key: &str) -> Option<(&str, &str)> {
    let open = key.find('[')?;
    let inner = key[open + 1..].strip_suffix(']')?;
    if open == 0 || inner.is_empty() || inner.contains('[') {
        return None;
    }
    Some((&key[..open], inner))
}
