use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A BLS public key, stored as the raw 48 bytes. `Display`/serde render it
/// lowercase and `0x`-prefixed; parsing accepts either case and an optional
/// prefix, matching the key-file format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKeyBytes([u8; 48]);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid validator public key: expected 96 hex characters, got {0:?}")]
pub struct InvalidPublicKey(String);

impl PublicKeyBytes {
    pub fn from_hex(s: &str) -> Result<Self, InvalidPublicKey> {
        let trimmed = s.trim();
        let stripped = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(stripped).map_err(|_| InvalidPublicKey(s.to_string()))?;
        let array: [u8; 48] = bytes
            .try_into()
            .map_err(|_| InvalidPublicKey(s.to_string()))?;
        Ok(Self(array))
    }

    /// A short form suitable for alert text: first 6 and last 4 hex chars.
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}…{}", &full[..8], &full[full.len() - 4..])
    }
}

impl fmt::Display for PublicKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyBytes({})", self)
    }
}

impl TryFrom<String> for PublicKeyBytes {
    type Error = InvalidPublicKey;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<PublicKeyBytes> for String {
    fn from(value: PublicKeyBytes) -> Self {
        value.to_string()
    }
}

/// The closed set of statuses a validator can be observed in. Mirrors the
/// beacon API's `status` field exactly so `ValidatorStatus` can be decoded
/// directly from the wire response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorStatus {
    PendingInitialized,
    PendingQueued,
    ActiveOngoing,
    ActiveExiting,
    ActiveSlashed,
    ExitedUnslashed,
    ExitedSlashed,
    WithdrawalPossible,
    WithdrawalDone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    pub pubkey: PublicKeyBytes,
    pub effective_balance_gwei: u64,
    pub slashed: bool,
}

/// A full status-partitioned validator set, as returned by a single
/// `states/head/validators` query.
#[derive(Debug, Clone, Default)]
pub struct ValidatorSetSnapshot {
    pub by_status: HashMap<ValidatorStatus, HashMap<u64, Validator>>,
}

impl ValidatorSetSnapshot {
    pub fn insert(&mut self, index: u64, status: ValidatorStatus, validator: Validator) {
        self.by_status.entry(status).or_default().insert(index, validator);
    }

    pub fn partition(&self, status: ValidatorStatus) -> impl Iterator<Item = (&u64, &Validator)> {
        self.by_status
            .get(&status)
            .into_iter()
            .flat_map(|m| m.iter())
    }

    /// Union of `active_ongoing`, `active_exiting`, `active_slashed`.
    pub fn active(&self) -> HashMap<u64, &Validator> {
        [
            ValidatorStatus::ActiveOngoing,
            ValidatorStatus::ActiveExiting,
            ValidatorStatus::ActiveSlashed,
        ]
        .into_iter()
        .flat_map(|status| self.partition(status))
        .map(|(index, validator)| (*index, validator))
        .collect()
    }

    pub fn pending_queued(&self) -> HashMap<u64, &Validator> {
        self.partition(ValidatorStatus::PendingQueued)
            .map(|(index, validator)| (*index, validator))
            .collect()
    }

    pub fn exited_unslashed(&self) -> HashMap<u64, &Validator> {
        self.partition(ValidatorStatus::ExitedUnslashed)
            .map(|(index, validator)| (*index, validator))
            .collect()
    }

    pub fn exited_slashed(&self) -> HashMap<u64, &Validator> {
        self.partition(ValidatorStatus::ExitedSlashed)
            .map(|(index, validator)| (*index, validator))
            .collect()
    }

    /// Union of `withdrawal_possible` and `withdrawal_done`.
    pub fn withdrawable(&self) -> HashMap<u64, &Validator> {
        [
            ValidatorStatus::WithdrawalPossible,
            ValidatorStatus::WithdrawalDone,
        ]
        .into_iter()
        .flat_map(|status| self.partition(status))
        .map(|(index, validator)| (*index, validator))
        .collect()
    }

    /// Restricts a partition (as produced by the helpers above) to indexes
    /// whose pubkey is in `own`.
    pub fn intersect_own<'a>(
        set: &HashMap<u64, &'a Validator>,
        own: &OwnKeySet,
    ) -> HashMap<u64, &'a Validator> {
        set.iter()
            .filter(|(_, validator)| own.contains(&validator.pubkey))
            .map(|(index, validator)| (*index, *validator))
            .collect()
    }
}

/// The operator-supplied set of public keys to watch, refreshed from a
/// key file at the start of every epoch.
#[derive(Debug, Clone, Default)]
pub struct OwnKeySet(HashSet<PublicKeyBytes>);

impl OwnKeySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_keys(keys: impl IntoIterator<Item = PublicKeyBytes>) -> Self {
        Self(keys.into_iter().collect())
    }

    pub fn contains(&self, pubkey: &PublicKeyBytes) -> bool {
        self.0.contains(pubkey)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PublicKeyBytes> {
        self.0.iter()
    }
}

/// Parses the key-file format: one hex-encoded 96-character (48-byte)
/// public key per line, optional `0x` prefix, blank lines ignored. Any
/// invalid line rejects the whole refresh.
pub fn parse_pubkeys_file(contents: &str) -> Result<OwnKeySet, InvalidPublicKey> {
    let keys = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PublicKeyBytes::from_hex)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(OwnKeySet::from_keys(keys))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> PublicKeyBytes {
        PublicKeyBytes([byte; 48])
    }

    #[test]
    fn pubkey_parses_with_and_without_prefix() {
        let plain = "aa".repeat(48);
        let prefixed = format!("0x{plain}");
        assert_eq!(
            PublicKeyBytes::from_hex(&plain).unwrap(),
            PublicKeyBytes::from_hex(&prefixed).unwrap()
        );
    }

    #[test]
    fn pubkey_rejects_wrong_length() {
        assert!(PublicKeyBytes::from_hex("aabb").is_err());
    }

    #[test]
    fn parse_pubkeys_file_skips_blank_lines() {
        let contents = format!("{}\n\n{}\n", "aa".repeat(48), "bb".repeat(48));
        let set = parse_pubkeys_file(&contents).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn active_is_union_of_three_statuses() {
        let mut snapshot = ValidatorSetSnapshot::default();
        snapshot.insert(
            1,
            ValidatorStatus::ActiveOngoing,
            Validator {
                pubkey: key(1),
                effective_balance_gwei: 32_000_000_000,
                slashed: false,
            },
        );
        snapshot.insert(
            2,
            ValidatorStatus::ActiveSlashed,
            Validator {
                pubkey: key(2),
                effective_balance_gwei: 32_000_000_000,
                slashed: true,
            },
        );
        snapshot.insert(
            3,
            ValidatorStatus::PendingQueued,
            Validator {
                pubkey: key(3),
                effective_balance_gwei: 32_000_000_000,
                slashed: false,
            },
        );
        assert_eq!(snapshot.active().len(), 2);
        assert_eq!(snapshot.pending_queued().len(), 1);
    }
}
