//! BitGo proprietary key-values in PSBT maps.
//!
//! Keys use the `BITGO` identifier followed by a one-byte subtype.

use std::collections::BTreeMap;

use crate::bitcoin::psbt::raw::ProprietaryKey;
use crate::bitcoin::psbt::Psbt;
use crate::bitcoin::{CompressedPublicKey, XOnlyPublicKey};
use crate::error::{Result, UtxoError};

/// BitGo proprietary key identifier
pub const BITGO: &[u8] = b"BITGO";

/// Subtypes for proprietary keys that BitGo uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProprietaryKeySubtype {
    ZecConsensusBranchId = 0x00,
    Musig2ParticipantPubKeys = 0x01,
    Musig2PubNonce = 0x02,
    Musig2PartialSig = 0x03,
}

impl ProprietaryKeySubtype {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(ProprietaryKeySubtype::ZecConsensusBranchId),
            0x01 => Some(ProprietaryKeySubtype::Musig2ParticipantPubKeys),
            0x02 => Some(ProprietaryKeySubtype::Musig2PubNonce),
            0x03 => Some(ProprietaryKeySubtype::Musig2PartialSig),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitGoKeyValue {
    pub subtype: ProprietaryKeySubtype,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl BitGoKeyValue {
    pub fn new(subtype: ProprietaryKeySubtype, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            subtype,
            key,
            value,
        }
    }

    pub fn from_key_value(key: &ProprietaryKey, value: &[u8]) -> Result<Self> {
        if key.prefix.as_slice() != BITGO {
            return Err(UtxoError::format("not a BitGo proprietary key"));
        }
        let subtype = ProprietaryKeySubtype::from_u8(key.subtype).ok_or_else(|| {
            UtxoError::format(format!(
                "unknown BitGo proprietary key subtype {}",
                key.subtype
            ))
        })?;
        Ok(Self::new(subtype, key.key.clone(), value.to_vec()))
    }

    pub fn to_key_value(&self) -> (ProprietaryKey, Vec<u8>) {
        let key = ProprietaryKey {
            prefix: BITGO.to_vec(),
            subtype: self.subtype as u8,
            key: self.key.clone(),
        };
        (key, self.value.clone())
    }
}

/// BitGo key-values of `subtype` in a proprietary map.
pub fn find_kv(
    subtype: ProprietaryKeySubtype,
    map: &BTreeMap<ProprietaryKey, Vec<u8>>,
) -> impl Iterator<Item = BitGoKeyValue> + '_ {
    map.iter()
        .filter(move |(k, _)| k.prefix.as_slice() == BITGO && k.subtype == subtype as u8)
        .filter_map(|(k, v)| BitGoKeyValue::from_key_value(k, v).ok())
}

/// Zcash consensus branch id stored as 4 bytes little-endian in the global map.
pub fn get_zec_consensus_branch_id(psbt: &Psbt) -> Option<u32> {
    let kv = find_kv(ProprietaryKeySubtype::ZecConsensusBranchId, &psbt.proprietary).next()?;
    let bytes: [u8; 4] = kv.value.as_slice().try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

pub fn set_zec_consensus_branch_id(psbt: &mut Psbt, branch_id: u32) {
    let (key, value) = BitGoKeyValue::new(
        ProprietaryKeySubtype::ZecConsensusBranchId,
        vec![],
        branch_id.to_le_bytes().to_vec(),
    )
    .to_key_value();
    psbt.proprietary.insert(key, value);
}

/// Participants of a MuSig2 key-path output.
///
/// Keyed by `output_key || internal_key`, the value holds the user and
/// bitgo keys in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Musig2Participants {
    pub output_key: XOnlyPublicKey,
    pub internal_key: XOnlyPublicKey,
    pub participants: [CompressedPublicKey; 2],
}

impl Musig2Participants {
    pub fn to_key_value(&self) -> BitGoKeyValue {
        let mut key = self.output_key.serialize().to_vec();
        key.extend_from_slice(&self.internal_key.serialize());
        let mut value = self.participants[0].to_bytes().to_vec();
        value.extend_from_slice(&self.participants[1].to_bytes());
        BitGoKeyValue::new(ProprietaryKeySubtype::Musig2ParticipantPubKeys, key, value)
    }

    pub fn from_key_value(kv: &BitGoKeyValue) -> Result<Self> {
        if kv.subtype != ProprietaryKeySubtype::Musig2ParticipantPubKeys {
            return Err(UtxoError::format("not a MuSig2 participants record"));
        }
        if kv.key.len() != 64 || kv.value.len() != 66 {
            return Err(UtxoError::format(format!(
                "invalid MuSig2 participants record ({} byte key, {} byte value)",
                kv.key.len(),
                kv.value.len()
            )));
        }
        let xonly = |bytes: &[u8]| {
            XOnlyPublicKey::from_slice(bytes).map_err(|e| UtxoError::format(e.to_string()))
        };
        let compressed = |bytes: &[u8]| {
            CompressedPublicKey::from_slice(bytes).map_err(|e| UtxoError::format(e.to_string()))
        };
        Ok(Self {
            output_key: xonly(&kv.key[..32])?,
            internal_key: xonly(&kv.key[32..])?,
            participants: [compressed(&kv.value[..33])?, compressed(&kv.value[33..])?],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::transaction::{Transaction, Version};
    use crate::bitcoin::absolute::LockTime;
    use crate::fixed_script_wallet::test_utils::golden_wallet_keys;
    use crate::fixed_script_wallet::wallet_scripts::create_key_path_p2tr_musig2;
    use crate::fixed_script_wallet::wallet_keys::KeyRole;

    fn empty_psbt() -> Psbt {
        Psbt::from_unsigned_tx(Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![],
        })
        .unwrap()
    }

    #[test]
    fn consensus_branch_id() {
        let mut psbt = empty_psbt();
        assert_eq!(get_zec_consensus_branch_id(&psbt), None);
        set_zec_consensus_branch_id(&mut psbt, 0xc2d6d0b4);
        assert_eq!(get_zec_consensus_branch_id(&psbt), Some(0xc2d6d0b4));

        let (key, _) = find_kv(ProprietaryKeySubtype::ZecConsensusBranchId, &psbt.proprietary)
            .next()
            .unwrap()
            .to_key_value();
        assert_eq!(key.prefix, b"BITGO".to_vec());
        assert_eq!(key.subtype, 0);
        assert!(key.key.is_empty());
    }

    #[test]
    fn musig2_participants() {
        let keys = golden_wallet_keys().derive_for_chain_and_index(40, 0).unwrap();
        let key_path = create_key_path_p2tr_musig2(&keys.pub_triple()).unwrap();
        let record = Musig2Participants {
            output_key: key_path.output_pubkey,
            internal_key: key_path.internal_pubkey,
            participants: [keys.key(KeyRole::User), keys.key(KeyRole::Bitgo)],
        };
        let kv = record.to_key_value();
        assert_eq!(kv.key.len(), 64);
        assert_eq!(&kv.value[..33], &keys.key(KeyRole::User).to_bytes()[..]);
        assert_eq!(Musig2Participants::from_key_value(&kv).unwrap(), record);

        let truncated = BitGoKeyValue::new(kv.subtype, kv.key.clone(), kv.value[..33].to_vec());
        assert!(matches!(
            Musig2Participants::from_key_value(&truncated),
            Err(UtxoError::Format(_))
        ));
    }

    #[test]
    fn unknown_subtype_is_rejected() {
        let key = ProprietaryKey {
            prefix: BITGO.to_vec(),
            subtype: 0x7f,
            key: vec![],
        };
        assert!(BitGoKeyValue::from_key_value(&key, &[]).is_err());
    }
}
