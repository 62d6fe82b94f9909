//! Learned type predictions for values that have not been forced yet.
//!
//! Every successful force records `operation(input types) -> output type`.
//! Asking for a prediction replays those counts for the current input
//! types. Predictions are advisory: nothing that affects a result may
//! depend on them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use tracing::debug;

use crate::errors::Result;
use crate::sync::lock;
use crate::types::Type;
use crate::values::Value;

/// Inputs past this many are ignored when building signatures.
const MAX_INPUTS: usize = 10;
/// Upper bound on the signatures a single lookup expands to.
const MAX_SIGNATURES: usize = 64;
/// Nested unforced inputs are predicted this many levels down, then `Any`.
const MAX_NESTING: usize = 8;

type Candidates = SmallVec<[Type; 4]>;

/// A distribution over output types. Counts are not normalised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypePrediction {
    counts: BTreeMap<Type, u64>,
    total: u64,
}

impl TypePrediction {
    /// The prediction for a value whose type is already known.
    pub fn certain(ty: Type) -> Self {
        let mut prediction = Self::default();
        prediction.add(ty, 1);
        prediction
    }

    fn add(&mut self, ty: Type, count: u64) {
        *self.counts.entry(ty).or_default() += count;
        self.total += count;
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn count(&self, ty: Type) -> u64 {
        self.counts.get(&ty).copied().unwrap_or(0)
    }

    /// Share of observations that produced `ty`, between 0 and 1.
    pub fn probability(&self, ty: Type) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count(ty) as f64 / self.total as f64
    }

    /// The most frequently observed type. Ties go to the type declared
    /// first in [`Type`].
    pub fn probable_type(&self) -> Option<Type> {
        self.counts
            .iter()
            .max_by(|(a_ty, a), (b_ty, b)| a.cmp(b).then_with(|| b_ty.cmp(a_ty)))
            .map(|(ty, _)| *ty)
    }

    /// Observed types, most frequent first.
    pub fn types(&self) -> Vec<Type> {
        let mut types: Vec<(Type, u64)> = self.counts.iter().map(|(t, c)| (*t, *c)).collect();
        types.sort_by(|(a_ty, a), (b_ty, b)| b.cmp(a).then_with(|| a_ty.cmp(b_ty)));
        types.into_iter().map(|(ty, _)| ty).collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Entry {
    counts: BTreeMap<Type, u64>,
    /// Milliseconds since the Unix epoch.
    updated: u64,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<(String, Entry)>,
}

/// Accumulates output type counts per operation and input signature.
pub struct TypeLearner {
    expiry: Option<Duration>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl TypeLearner {
    pub fn new(expiry: Option<Duration>) -> Self {
        Self {
            expiry,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record that `operation` over `inputs` produced `output`.
    pub fn learn(&self, operation: &str, inputs: &[Value], output: Type) {
        let keys = self.keys(operation, inputs, 0);
        let now = now_millis();
        let mut entries = lock(&self.entries);
        for key in keys {
            let entry = entries.entry(key).or_default();
            *entry.counts.entry(output).or_default() += 1;
            entry.updated = now;
        }
    }

    /// Predict the output type of `operation` over `inputs`. Empty when
    /// nothing has been learned for any matching signature.
    pub fn predict(&self, operation: &str, inputs: &[Value]) -> TypePrediction {
        self.predict_nested(operation, inputs, 0)
    }

    fn predict_nested(&self, operation: &str, inputs: &[Value], nesting: usize) -> TypePrediction {
        let keys = self.keys(operation, inputs, nesting);
        let entries = lock(&self.entries);
        let mut prediction = TypePrediction::default();
        for key in &keys {
            if let Some(entry) = entries.get(key) {
                for (ty, count) in &entry.counts {
                    prediction.add(*ty, *count);
                }
            }
        }
        prediction
    }

    /// Number of learned signatures.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Write every learned signature to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = Snapshot {
            entries: lock(&self.entries)
                .iter()
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect(),
        };
        std::fs::write(path, postcard::to_allocvec(&snapshot)?)?;
        debug!(path = %path.display(), entries = snapshot.entries.len(), "saved type predictions");
        Ok(())
    }

    /// Merge the signatures saved at `path`, skipping expired ones.
    /// Returns how many were kept.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let snapshot: Snapshot = postcard::from_bytes(&bytes)?;

        let cutoff = self
            .expiry
            .map(|expiry| now_millis().saturating_sub(expiry.as_millis() as u64));
        let mut entries = lock(&self.entries);
        let mut kept = 0;
        for (key, loaded) in snapshot.entries {
            if cutoff.is_some_and(|cutoff| loaded.updated < cutoff) {
                continue;
            }
            let entry = entries.entry(key).or_default();
            for (ty, count) in loaded.counts {
                *entry.counts.entry(ty).or_default() += count;
            }
            entry.updated = entry.updated.max(loaded.updated);
            kept += 1;
        }
        debug!(path = %path.display(), kept, "loaded type predictions");
        Ok(kept)
    }

    fn keys(&self, operation: &str, inputs: &[Value], nesting: usize) -> Vec<String> {
        let per_input: Vec<Candidates> = inputs
            .iter()
            .take(MAX_INPUTS)
            .map(|input| self.candidates(input, nesting))
            .collect();
        signatures(&per_input)
            .into_iter()
            .map(|signature| format!("{}({})", operation, signature))
            .collect()
    }

    fn candidates(&self, input: &Value, nesting: usize) -> Candidates {
        let Some(lambda) = input.as_lambda() else {
            return smallvec![input.data().ty()];
        };
        if let Some(value) = lambda.cached() {
            return smallvec![value.data().ty()];
        }
        if nesting >= MAX_NESTING {
            return smallvec![Type::Any];
        }
        let types = self
            .predict_nested(lambda.operation(), lambda.inputs(), nesting + 1)
            .types();
        if types.is_empty() {
            smallvec![Type::Any]
        } else {
            types.into_iter().collect()
        }
    }
}

impl Default for TypeLearner {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for TypeLearner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeLearner")
            .field("expiry", &self.expiry)
            .field("signatures", &self.len())
            .finish()
    }
}

/// The cartesian product of per-input candidates, as `-` joined names.
fn signatures(per_input: &[Candidates]) -> Vec<String> {
    let mut signatures = vec![String::new()];
    for (i, candidates) in per_input.iter().enumerate() {
        let mut next = Vec::with_capacity(signatures.len() * candidates.len());
        'outer: for prefix in &signatures {
            for ty in candidates {
                if next.len() == MAX_SIGNATURES {
                    break 'outer;
                }
                let mut signature = prefix.clone();
                if i > 0 {
                    signature.push('-');
                }
                signature.push_str(&ty.to_string());
                next.push(signature);
            }
        }
        signatures = next;
    }
    signatures
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

impl Value {
    /// Predict this value's type without forcing it.
    pub fn predict_type(&self) -> TypePrediction {
        match self.as_lambda() {
            None => TypePrediction::certain(self.data().ty()),
            Some(lambda) => match lambda.cached() {
                Some(value) => TypePrediction::certain(value.data().ty()),
                None => lambda
                    .scope()
                    .runtime()
                    .learner()
                    .predict(lambda.operation(), lambda.inputs()),
            },
        }
    }
}
