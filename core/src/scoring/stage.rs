use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::error::SearchError;

/// The scoring stages. Each contributes one weighted share of the combined score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Inverted-index retrieval.
    Retrieval,
    /// Query understanding, annotations and intent boosts.
    Enhancement,
    /// TF-IDF/BM25/embedding ranking with personalization and business rules.
    Ranking,
    /// Whole-collection TF-IDF scored in parallel.
    Distributed,
    /// Cheap Jaccard pass over a prefix of the collection.
    Approximate,
    /// Business-intelligence completeness signal.
    Insight,
}

impl Stage {
    pub const COUNT: usize = 6;

    pub const ALL: [Stage; Stage::COUNT] = [
        Stage::Retrieval,
        Stage::Enhancement,
        Stage::Ranking,
        Stage::Distributed,
        Stage::Approximate,
        Stage::Insight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Retrieval => "retrieval",
            Stage::Enhancement => "enhancement",
            Stage::Ranking => "ranking",
            Stage::Distributed => "distributed",
            Stage::Approximate => "approximate",
            Stage::Insight => "insight",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = SearchError;

    /// Accepts the stage names and the older stone names used by existing clients.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "retrieval" | "space" => Ok(Stage::Retrieval),
            "enhancement" | "mind" => Ok(Stage::Enhancement),
            "ranking" | "reality" => Ok(Stage::Ranking),
            "distributed" | "power" => Ok(Stage::Distributed),
            "approximate" | "time" => Ok(Stage::Approximate),
            "insight" | "soul" => Ok(Stage::Insight),
            _ => Err(SearchError::UnknownStage(s.to_string())),
        }
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Stage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// One value per [`Stage`], stored in a fixed array so every stage is always covered.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StageTable<T> {
    slots: [T; Stage::COUNT],
}

impl<T> StageTable<T> {
    pub fn from_fn<F: FnMut(Stage) -> T>(mut f: F) -> Self {
        Self { slots: Stage::ALL.map(&mut f) }
    }

    pub fn get(&self, stage: Stage) -> &T {
        &self.slots[stage.index()]
    }

    pub fn get_mut(&mut self, stage: Stage) -> &mut T {
        &mut self.slots[stage.index()]
    }

    pub fn set(&mut self, stage: Stage, value: T) {
        self.slots[stage.index()] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, &T)> {
        Stage::ALL.into_iter().zip(self.slots.iter())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }

    pub fn map<U, F: FnMut(&T) -> U>(&self, mut f: F) -> StageTable<U> {
        StageTable::from_fn(|stage| f(self.get(stage)))
    }
}

impl StageTable<f64> {
    pub fn scaled(&self, factor: f64) -> Self {
        self.map(|w| w * factor)
    }
}

impl<T: Serialize> Serialize for StageTable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Stage::COUNT))?;
        for (stage, value) in self.iter() {
            map.serialize_entry(stage.as_str(), value)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for StageTable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for TableVisitor<T> {
            type Value = StageTable<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map with one entry per stage")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut slots: [Option<T>; Stage::COUNT] = Default::default();
                while let Some((stage, value)) = access.next_entry::<Stage, T>()? {
                    slots[stage.index()] = Some(value);
                }
                let mut missing = Vec::new();
                let mut values = Vec::with_capacity(Stage::COUNT);
                for (stage, slot) in Stage::ALL.into_iter().zip(slots) {
                    match slot {
                        Some(value) => values.push(value),
                        None => missing.push(stage.as_str()),
                    }
                }
                if !missing.is_empty() {
                    return Err(de::Error::custom(format!("missing stages: {}", missing.join(", "))));
                }
                let slots: [T; Stage::COUNT] = values
                    .try_into()
                    .map_err(|_| de::Error::custom("stage table has the wrong length"))?;
                Ok(StageTable { slots })
            }
        }

        deserializer.deserialize_map(TableVisitor(PhantomData))
    }
}
