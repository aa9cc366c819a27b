//! Tolerant field lookup over JSON objects.
//!
//! Clients send the same logical field under several spellings and with
//! integers encoded as floats. Each accessor takes the accepted aliases in
//! priority order; the first present, non-null value wins. Type mismatches
//! fall back to the zero value instead of failing.

use serde_json::{Map, Value};

/// Read-only view of one JSON object.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Fields<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    /// First present, non-null value among `aliases`.
    pub(crate) fn get(&self, aliases: &[&str]) -> Option<&'a Value> {
        aliases
            .iter()
            .filter_map(|key| self.map.get(*key))
            .find(|v| !v.is_null())
    }

    pub(crate) fn int(&self, aliases: &[&str]) -> i64 {
        self.get(aliases).map_or(0, coerce_int)
    }

    pub(crate) fn flag(&self, aliases: &[&str]) -> bool {
        self.get(aliases).and_then(Value::as_bool).unwrap_or(false)
    }

    pub(crate) fn text(&self, aliases: &[&str]) -> String {
        self.get(aliases)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Object elements of the array under `aliases`. Non-object elements are
    /// skipped; a missing or non-array field yields nothing.
    pub(crate) fn objects(&self, aliases: &[&str]) -> impl Iterator<Item = Fields<'a>> + use<'a> {
        self.get(aliases)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
            .map(Fields::new)
    }
}

/// Integers pass through, floats truncate toward zero, anything else is 0.
#[allow(clippy::cast_possible_truncation)]
fn coerce_int(value: &Value) -> i64 {
    let Value::Number(n) = value else {
        return 0;
    };
    n.as_i64()
        .or_else(|| n.as_u64().map(|_| i64::MAX))
        .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with<R>(value: &Value, f: impl FnOnce(Fields<'_>) -> R) -> R {
        f(Fields::new(value.as_object().unwrap()))
    }

    #[test]
    fn first_present_alias_wins() {
        let v = json!({"tableNumber": 3, "table_number": 9});
        assert_eq!(with(&v, |f| f.int(&["table_number", "tableNumber"])), 9);
        assert_eq!(with(&v, |f| f.int(&["tableNumber", "table_number"])), 3);
    }

    #[test]
    fn null_falls_through_to_next_alias() {
        let v = json!({"table_number": null, "tableNumber": 4});
        assert_eq!(with(&v, |f| f.int(&["table_number", "tableNumber"])), 4);
    }

    #[test]
    fn floats_truncate() {
        let v = json!({"a": 7.0, "b": 2.9, "c": -2.9});
        with(&v, |f| {
            assert_eq!(f.int(&["a"]), 7);
            assert_eq!(f.int(&["b"]), 2);
            assert_eq!(f.int(&["c"]), -2);
        });
    }

    #[test]
    fn mismatched_types_are_zero_values() {
        let v = json!({"n": "12", "b": "true", "s": 5, "o": {"x": 1}});
        with(&v, |f| {
            assert_eq!(f.int(&["n"]), 0);
            assert_eq!(f.int(&["o"]), 0);
            assert!(!f.flag(&["b"]));
            assert_eq!(f.text(&["s"]), "");
            assert_eq!(f.int(&["missing"]), 0);
        });
    }

    #[test]
    fn huge_unsigned_saturates() {
        let v = json!({"n": u64::MAX});
        assert_eq!(with(&v, |f| f.int(&["n"])), i64::MAX);
    }

    #[test]
    fn objects_skip_non_objects() {
        let v = json!({"items": [{"id": 1}, 5, null, {"id": 2}]});
        let ids: Vec<i64> = with(&v, |f| f.objects(&["items"]).map(|i| i.int(&["id"])).collect());
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn objects_of_non_array_is_empty() {
        let v = json!({"items": {"id": 1}});
        assert_eq!(with(&v, |f| f.objects(&["items"]).count()), 0);
    }
}
