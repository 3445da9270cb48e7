use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Nested record the registry may or may not attach.
///
/// Serialized as the bare value or `null`, so it is wire-compatible with an
/// `Option<T>` while forcing call sites to name the missing case.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Bound<T> {
    Present(T),
    #[default]
    Missing,
}

impl<T> Bound<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Bound::Present(_))
    }

    pub fn as_present(&self) -> Option<&T> {
        match self {
            Bound::Present(value) => Some(value),
            Bound::Missing => None,
        }
    }

    pub fn into_present(self) -> Option<T> {
        match self {
            Bound::Present(value) => Some(value),
            Bound::Missing => None,
        }
    }
}

impl<T> From<Option<T>> for Bound<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Bound::Present(value),
            None => Bound::Missing,
        }
    }
}

impl<T: Serialize> Serialize for Bound<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_present().serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Bound<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Bound::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(default)]
        value: Bound<u32>,
    }

    #[test]
    fn null_and_absent_are_missing() {
        let null: Holder = serde_json::from_str(r#"{"value": null}"#).unwrap();
        let absent: Holder = serde_json::from_str("{}").unwrap();
        assert_eq!(null.value, Bound::Missing);
        assert_eq!(absent.value, Bound::Missing);
    }

    #[test]
    fn value_is_present() {
        let holder: Holder = serde_json::from_str(r#"{"value": 7}"#).unwrap();
        assert_eq!(holder.value.as_present(), Some(&7));
    }
}
