use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::faker::LocaleKey;
use crate::params::Params;
use crate::value::{Fields, Value};

/// Row currently being expanded whose friends are running.
#[derive(Debug, Clone)]
pub struct Ancestor {
    pub object: String,
    pub nickname: Option<String>,
    pub id: u64,
}

impl Ancestor {
    fn matches(&self, target: &str) -> bool {
        self.object == target || self.nickname.as_deref() == Some(target)
    }
}

#[derive(Debug, Default)]
struct EmittedRows {
    /// Ids in emission order, for uniform random picks.
    ids: Vec<u64>,
    by_id: HashMap<u64, Fields>,
}

/// Mutable state of one run: parameters, counters, rng and every emitted row.
#[derive(Debug)]
pub struct GenerationContext {
    params: Params,
    locale: LocaleKey,
    rng: ChaCha8Rng,
    counters: HashMap<String, u64>,
    rows: HashMap<String, EmittedRows>,
    latest_by_object: HashMap<String, u64>,
    latest_by_nickname: HashMap<String, u64>,
    nicknames: HashMap<String, String>,
    ancestors: Vec<Ancestor>,
}

impl GenerationContext {
    pub fn new(params: Params, seed: u64, locale: LocaleKey) -> Self {
        Self {
            params,
            locale,
            rng: ChaCha8Rng::seed_from_u64(seed),
            counters: HashMap::new(),
            rows: HashMap::new(),
            latest_by_object: HashMap::new(),
            latest_by_nickname: HashMap::new(),
            nicknames: HashMap::new(),
            ancestors: Vec::new(),
        }
    }

    pub fn locale(&self) -> LocaleKey {
        self.locale
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn register_nickname(&mut self, nickname: &str, object: &str) {
        self.nicknames
            .insert(nickname.to_string(), object.to_string());
    }

    /// Object type behind a template name.
    pub fn object_for<'a>(&'a self, target: &'a str) -> &'a str {
        self.nicknames
            .get(target)
            .map(String::as_str)
            .unwrap_or(target)
    }

    /// Current counter value; zero before the first row of `object`.
    pub fn counter(&self, object: &str) -> u64 {
        self.counters.get(object).copied().unwrap_or(0)
    }

    pub fn next_id(&mut self, object: &str) -> u64 {
        let counter = self.counters.entry(object.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn record_row(&mut self, object: &str, nickname: Option<&str>, id: u64, fields: Fields) {
        let rows = self.rows.entry(object.to_string()).or_default();
        rows.ids.push(id);
        rows.by_id.insert(id, fields);
        self.latest_by_object.insert(object.to_string(), id);
        if let Some(nickname) = nickname {
            self.latest_by_nickname.insert(nickname.to_string(), id);
        }
    }

    pub fn row(&self, object: &str, id: u64) -> Option<&Fields> {
        self.rows.get(object).and_then(|rows| rows.by_id.get(&id))
    }

    pub fn emitted_ids(&self, object: &str) -> &[u64] {
        self.rows
            .get(object)
            .map(|rows| rows.ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn rows_emitted(&self, object: &str) -> usize {
        self.emitted_ids(object).len()
    }

    /// Last row emitted under `target` as a nickname, then as an object type.
    /// The innermost matching ancestor is the fallback when neither exists.
    pub fn resolve_latest(&self, target: &str) -> Option<(String, u64)> {
        if let Some(id) = self.latest_by_nickname.get(target) {
            return Some((self.object_for(target).to_string(), *id));
        }
        if let Some(id) = self.latest_by_object.get(target) {
            return Some((target.to_string(), *id));
        }
        self.ancestors
            .iter()
            .rev()
            .find(|ancestor| ancestor.matches(target))
            .map(|ancestor| (ancestor.object.clone(), ancestor.id))
    }

    pub fn push_ancestor(&mut self, ancestor: Ancestor) {
        self.ancestors.push(ancestor);
    }

    pub fn pop_ancestor(&mut self) -> Option<Ancestor> {
        self.ancestors.pop()
    }
}
