pub mod bits;
pub mod chain_spec;
pub mod epoch_cache;
pub mod slot_epoch;
pub mod validator;

pub use bits::{aggregate_bits, apply_mask, decode_aggregation_bits, BitError};
pub use chain_spec::ChainSpec;
pub use epoch_cache::{BoundedEpochCache, EPOCH_CACHE_DEPTH};
pub use slot_epoch::{Epoch, Slot};
pub use validator::{
    parse_pubkeys_file, InvalidPublicKey, OwnKeySet, PublicKeyBytes, Validator, ValidatorSetSnapshot,
    ValidatorStatus,
};
