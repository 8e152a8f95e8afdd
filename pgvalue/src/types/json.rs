use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::value::{ConvertError, FromValue, Value, ValueKind};

/// Read and write postgres `json` or `jsonb` value as `T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> FromValue for Json<T>
where
    T: DeserializeOwned,
{
    const KIND: ValueKind = ValueKind::Json;

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Json(json) => serde_json::from_value(json)
                .map(Json)
                .map_err(|e| ConvertError::Json(e.to_string())),
            Value::Null => Err(ConvertError::UnexpectedNull),
            value => Err(ConvertError::mismatch(Self::KIND, &value)),
        }
    }
}

/// Serialization may fail depending on the [`Serialize`] implementation.
impl<T: Serialize> TryFrom<Json<T>> for Value {
    type Error = serde_json::Error;

    fn try_from(value: Json<T>) -> Result<Self, Self::Error> {
        serde_json::to_value(value.0).map(Value::Json)
    }
}

impl<T: Serialize> Serialize for Json<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Json<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self(T::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn typed_json() {
        let value = Value::Json(serde_json::json!({ "a": [1, 2], "b": [] }));
        let Json(map) = Json::<BTreeMap<String, Vec<i32>>>::from_value(value.clone()).unwrap();
        assert_eq!(map["a"], [1, 2]);
        assert_eq!(Value::try_from(Json(map)).unwrap(), value);
    }

    #[test]
    fn wrong_shape() {
        let value = Value::Json(serde_json::json!("text"));
        let err = Json::<Vec<i32>>::from_value(value).unwrap_err();
        assert!(matches!(err, ConvertError::Json(_)));
    }
}
