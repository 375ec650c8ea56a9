use std::collections::HashMap;

use serde_json::Value;

use crate::error::FeedError;
use crate::exchange::InstrumentId;

/// One-to-one mapping between instrument ids and `BASE-QUOTE` pairs.
///
/// Both directions are built together and uniqueness is checked on
/// construction, so lookups in either direction always agree.
#[derive(Debug, Clone, Default)]
pub struct InstrumentMap {
    by_id: HashMap<InstrumentId, String>,
    by_pair: HashMap<String, InstrumentId>,
}

impl InstrumentMap {
    pub fn from_entries(
        entries: impl IntoIterator<Item = (InstrumentId, String)>,
    ) -> Result<Self, FeedError> {
        let mut map = Self::default();
        for (id, pair) in entries {
            if let Some(existing) = map.by_id.get(&id) {
                return Err(FeedError::InvalidInstrumentMap(format!(
                    "instrument {id} listed as both {existing} and {pair}"
                )));
            }
            if let Some(existing) = map.by_pair.get(&pair) {
                return Err(FeedError::InvalidInstrumentMap(format!(
                    "pair {pair} listed under instruments {existing} and {id}"
                )));
            }
            map.by_pair.insert(pair.clone(), id);
            map.by_id.insert(id, pair);
        }
        Ok(map)
    }

    /// Build from a `GetInstruments` response:
    /// `[{"InstrumentId": 13, "Product1Symbol": "BTC", "Product2Symbol": "USDT"}, ...]`.
    pub fn from_instruments_response(body: &Value) -> Result<Self, FeedError> {
        let entries = body.as_array().ok_or_else(|| {
            FeedError::InvalidInstrumentMap("instruments response is not an array".into())
        })?;

        let mut pairs = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = entry["InstrumentId"].as_u64().ok_or_else(|| {
                FeedError::InvalidInstrumentMap(format!("entry without InstrumentId: {entry}"))
            })?;
            let base = entry["Product1Symbol"].as_str().ok_or_else(|| {
                FeedError::InvalidInstrumentMap(format!("entry without Product1Symbol: {entry}"))
            })?;
            let quote = entry["Product2Symbol"].as_str().ok_or_else(|| {
                FeedError::InvalidInstrumentMap(format!("entry without Product2Symbol: {entry}"))
            })?;
            pairs.push((
                InstrumentId(id),
                format!("{}-{}", base.to_uppercase(), quote.to_uppercase()),
            ));
        }
        Self::from_entries(pairs)
    }

    pub fn instrument_id(&self, trading_pair: &str) -> Option<InstrumentId> {
        self.by_pair.get(trading_pair).copied()
    }

    pub fn trading_pair(&self, id: InstrumentId) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
