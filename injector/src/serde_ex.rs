/// Values written as strings but accepted as either a string or a bare number, for fields such as
/// `endpointPort` that drivers document as strings and users often leave unquoted.
pub mod string {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            String(String),
            Number(serde_json::Number),
        }

        let s = match Repr::deserialize(deserializer)? {
            Repr::String(s) => s,
            Repr::Number(n) => n.to_string(),
        };
        s.trim().parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Port(#[serde(with = "super::string")] u16);

    #[test]
    fn accepts_strings_and_numbers() -> anyhow::Result<()> {
        assert_eq!(serde_json::from_str::<Port>("8080")?, Port(8080));
        assert_eq!(serde_json::from_str::<Port>(r#""8080""#)?, Port(8080));
        assert_eq!(serde_yaml::from_str::<Port>("8080")?, Port(8080));
        assert_eq!(serde_yaml::from_str::<Port>("'8080'")?, Port(8080));
        assert!(serde_json::from_str::<Port>(r#""http""#).is_err());
        Ok(())
    }

    #[test]
    fn writes_strings() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&Port(9400))?, r#""9400""#);
        Ok(())
    }
}
