use serde::de::{Deserializer, Error, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use crate::{Field, LorentzVector};

struct LorentzVectorVisitor<T: Field> {
    _marker: PhantomData<fn() -> LorentzVector<T>>,
}

impl<'de, T: Field + Deserialize<'de>> Visitor<'de> for LorentzVectorVisitor<T> {
    type Value = LorentzVector<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a sequence [t, x, y, z]")
    }

    fn visit_seq<M>(self, mut access: M) -> Result<Self::Value, M::Error>
    where
        M: SeqAccess<'de>,
    {
        let mut c = [T::default(); 4];
        for (i, name) in ["t", "x", "y", "z"].iter().enumerate() {
            c[i] = access
                .next_element::<T>()?
                .ok_or_else(|| M::Error::custom(format!("Cannot read {}-component", name)))?;
        }

        if access.next_element::<T>()?.is_some() {
            return Err(M::Error::custom("A four-vector has exactly four components"));
        }

        Ok(LorentzVector::from_slice(&c))
    }
}

impl<'de, T: Field + Deserialize<'de>> Deserialize<'de> for LorentzVector<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(LorentzVectorVisitor {
            _marker: PhantomData,
        })
    }
}

impl<T: Field + Serialize> Serialize for LorentzVector<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(4))?;
        seq.serialize_element(&self.t)?;
        seq.serialize_element(&self.x)?;
        seq.serialize_element(&self.y)?;
        seq.serialize_element(&self.z)?;
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use crate::LorentzVector;

    #[test]
    fn test_yaml_sequence() {
        let p: LorentzVector<f64> = serde_yaml::from_str("[11.0, 0.0, 0.5, 10.9]").unwrap();
        assert_eq!(p, LorentzVector::from_args(11.0, 0.0, 0.5, 10.9));

        let text = serde_yaml::to_string(&p).unwrap();
        let back: LorentzVector<f64> = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        assert!(serde_yaml::from_str::<LorentzVector<f64>>("[1.0, 2.0, 3.0]").is_err());
        assert!(serde_yaml::from_str::<LorentzVector<f64>>("[1.0, 2.0, 3.0, 4.0, 5.0]").is_err());
    }
}
