//! Run fingerprinting: deterministic identification of configs, inputs and outputs.
//!
//! - `config_id`: BLAKE3 of the canonical JSON of an `EngineConfig`.
//! - `dataset_hash`: BLAKE3 over every candle and signal of the stream.
//! - `trades_fingerprint`: BLAKE3 of the serialized trade list; two runs with
//!   identical input and configuration produce identical fingerprints.

use crate::config::EngineConfig;
use crate::domain::{AnnotatedCandle, ConfigId, DatasetHash, TradeRecord};

/// Structs serialize fields in declaration order, so the JSON is canonical.
fn hash_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut hasher = blake3::Hasher::new();
    serde_json::to_writer(&mut hasher, value)?;
    Ok(hasher.finalize().to_hex().to_string())
}

pub fn config_id(config: &EngineConfig) -> Result<ConfigId, serde_json::Error> {
    hash_json(config).map(ConfigId)
}

/// Content hash of the candle stream, using exact f64 bit patterns.
pub fn dataset_hash(stream: &[AnnotatedCandle]) -> DatasetHash {
    let mut hasher = blake3::Hasher::new();
    for a in stream {
        let c = &a.candle;
        hasher.update(&c.time.timestamp_millis().to_le_bytes());
        for v in [c.open, c.high, c.low, c.close, c.volume.unwrap_or(f64::NAN)] {
            hasher.update(&v.to_bits().to_le_bytes());
        }
        match a.signal {
            Some(sig) => {
                // Direction tag followed by the stop; absent stop hashes as NaN bits.
                hasher.update(format!("{:?}", sig.direction).as_bytes());
                hasher.update(&sig.stop_loss.unwrap_or(f64::NAN).to_bits().to_le_bytes());
            }
            None => {
                hasher.update(b"-");
            }
        }
    }
    DatasetHash(hasher.finalize().to_hex().to_string())
}

pub fn trades_fingerprint(trades: &[TradeRecord]) -> Result<String, serde_json::Error> {
    hash_json(trades)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Candle, Signal};
    use chrono::{TimeZone, Utc};

    fn stream() -> Vec<AnnotatedCandle> {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        vec![
            AnnotatedCandle::plain(Candle::new(t, 1.0, 2.0, 0.5, 1.5)),
            AnnotatedCandle::with_signal(
                Candle::new(t + chrono::Duration::hours(1), 1.5, 2.5, 1.0, 2.0),
                Signal::long(1.0),
            ),
        ]
    }

    #[test]
    fn config_id_is_stable_and_sensitive() {
        let a = config_id(&EngineConfig::default()).unwrap();
        let b = config_id(&EngineConfig::default()).unwrap();
        assert_eq!(a, b);
        let changed = EngineConfig {
            max_positions: 7,
            ..Default::default()
        };
        assert_ne!(a, config_id(&changed).unwrap());
    }

    #[test]
    fn dataset_hash_sees_signals() {
        let base = stream();
        let mut flipped = stream();
        flipped[1].signal = Some(Signal::short(3.0));
        assert_eq!(dataset_hash(&base), dataset_hash(&stream()));
        assert_ne!(dataset_hash(&base), dataset_hash(&flipped));
    }

    #[test]
    fn empty_trades_fingerprint() {
        let fp = trades_fingerprint(&[]).unwrap();
        assert_eq!(fp, blake3::hash(b"[]").to_hex().to_string());
    }
}
