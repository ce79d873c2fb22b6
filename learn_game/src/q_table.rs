use crate::board::{Move, StateKey};
use itertools::Itertools;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "V: Serialize", deserialize = "V: Deserialize<'de>"))]
pub struct Moves<V> {
    #[serde(serialize_with = "serialize_moves")]
    #[serde(deserialize_with = "deserialize_moves")]
    moves: BTreeMap<Move, V>,
}

impl<V> Deref for Moves<V> {
    type Target = BTreeMap<Move, V>;
    fn deref(&self) -> &Self::Target {
        &self.moves
    }
}

/// Mapping from state to per-move entries.
///
/// Reads through [`ValueTable::get`] never insert; only [`ValueTable::entry`]
/// grows the table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "V: Serialize", deserialize = "V: Deserialize<'de>"))]
pub struct ValueTable<V> {
    states: BTreeMap<StateKey, Moves<V>>,
}

impl<V> Default for ValueTable<V> {
    fn default() -> Self {
        ValueTable {
            states: BTreeMap::new(),
        }
    }
}

impl<V> Deref for ValueTable<V> {
    type Target = BTreeMap<StateKey, Moves<V>>;
    fn deref(&self) -> &Self::Target {
        &self.states
    }
}

impl<V: Copy + Default> ValueTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored entry, or `V::default()` when the pair was never written.
    pub fn get(&self, key: &StateKey, mv: &Move) -> V {
        self.states
            .get(key)
            .and_then(|moves| moves.get(mv))
            .copied()
            .unwrap_or_default()
    }

    pub fn entry(&mut self, key: StateKey, mv: Move) -> &mut V {
        self.states
            .entry(key)
            .or_default()
            .moves
            .entry(mv)
            .or_default()
    }

    pub fn pair_count(&self) -> usize {
        self.states.values().map(|moves| moves.len()).sum()
    }
}

pub type QTable = ValueTable<f32>;

impl QTable {
    /// Largest estimate among `moves`, or 0.0 when `moves` is empty.
    pub fn max_value(&self, key: &StateKey, moves: &[Move]) -> f32 {
        moves
            .iter()
            .map(|mv| self.get(key, mv))
            .max_by(|value1, value2| value1.total_cmp(value2))
            .unwrap_or(0.0)
    }

    /// All moves among `moves` attaining the largest estimate.
    pub fn max_moves(&self, key: &StateKey, moves: &[Move]) -> Vec<Move> {
        moves
            .iter()
            .max_set_by(|mv1, mv2| self.get(key, *mv1).total_cmp(&self.get(key, *mv2)))
            .into_iter()
            .copied()
            .collect()
    }
}

/// Visit count and running mean reward of one (state, move) pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmStats {
    pub visits: u32,
    pub mean: f32,
}

impl ArmStats {
    /// Folds one more observed reward into the running mean.
    pub fn record(&mut self, reward: f32) {
        self.visits += 1;
        self.mean += (reward - self.mean) / self.visits as f32;
    }
}

pub type VisitTable = ValueTable<ArmStats>;

impl VisitTable {
    pub fn total_visits(&self, key: &StateKey, moves: &[Move]) -> u32 {
        moves.iter().map(|mv| self.get(key, mv).visits).sum()
    }
}

fn serialize_moves<S, V>(moves: &BTreeMap<Move, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize,
{
    let mut map = serializer.serialize_map(Some(moves.len()))?;
    for (k, v) in moves {
        let key_str = format!("({}, {})", k.0, k.1);
        map.serialize_entry(&key_str, v)?;
    }
    map.end()
}

fn parse_move(key: &str) -> Option<Move> {
    key.trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(|part| part.trim().parse::<usize>().ok())
        .collect::<Option<Vec<usize>>>()?
        .into_iter()
        .collect_tuple()
}

fn deserialize_moves<'de, D, V>(deserializer: D) -> Result<BTreeMap<Move, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct MapVisitor<V> {
        marker: PhantomData<fn() -> BTreeMap<Move, V>>,
    }
    impl<'de, V: Deserialize<'de>> Visitor<'de> for MapVisitor<V> {
        type Value = BTreeMap<Move, V>;
        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a map keyed by \"(row, column)\" strings")
        }
        fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
        where
            M: MapAccess<'de>,
        {
            let mut map = BTreeMap::new();
            while let Some((key, value)) = access.next_entry::<String, V>()? {
                let mv = parse_move(&key).ok_or_else(|| {
                    <M::Error as de::Error>::invalid_value(
                        de::Unexpected::Str(&key),
                        &"\"(row, column)\"",
                    )
                })?;
                map.insert(mv, value);
            }
            Ok(map)
        }
    }
    deserializer.deserialize_map(MapVisitor {
        marker: PhantomData,
    })
}
