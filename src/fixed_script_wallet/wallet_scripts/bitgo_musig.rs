//! Key aggregation for BitGo Taproot outputs.
//!
//! Chains 30/31 use an early MuSig2 draft that aggregates x-only keys after
//! sorting them. Chains 40/41 use BIP327 `KeyAgg` over `[user, bitgo]`.

use k256::elliptic_curve::bigint::U256;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar};

use crate::bitcoin::hashes::{sha256, Hash, HashEngine};
use crate::bitcoin::CompressedPublicKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitGoMusigError(pub String);

impl std::fmt::Display for BitGoMusigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "key aggregation failed: {}", self.0)
    }
}

impl std::error::Error for BitGoMusigError {}

fn tagged_hash(tag: &str, data: &[&[u8]]) -> [u8; 32] {
    let tag_hash = sha256::Hash::hash(tag.as_bytes());
    let mut engine = sha256::Hash::engine();
    engine.input(tag_hash.as_byte_array());
    engine.input(tag_hash.as_byte_array());
    for d in data {
        engine.input(d);
    }
    sha256::Hash::from_engine(engine).to_byte_array()
}

fn lift_x(x: &[u8]) -> Result<ProjectivePoint, BitGoMusigError> {
    let mut bytes = [0u8; 33];
    bytes[0] = 0x02;
    bytes[1..].copy_from_slice(x);
    let encoded =
        EncodedPoint::from_bytes(bytes).map_err(|e| BitGoMusigError(format!("{}", e)))?;
    let point: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
    point
        .map(ProjectivePoint::from)
        .ok_or_else(|| BitGoMusigError("invalid x-only public key".to_string()))
}

fn key_agg_coefficient(list_hash: &[u8; 32], key: &[u8], second_key: Option<&[u8]>) -> Scalar {
    if second_key == Some(key) {
        return Scalar::ONE;
    }
    let hash = tagged_hash("KeyAgg coefficient", &[list_hash, key]);
    <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(hash))
}

/// Aggregate x-only keys the way the legacy `p2tr` chains do.
fn key_agg_xonly(keys: &[[u8; 32]]) -> Result<[u8; 32], BitGoMusigError> {
    let concatenated: Vec<u8> = keys.iter().flat_map(|k| k.iter().copied()).collect();
    let list_hash = tagged_hash("KeyAgg list", &[&concatenated]);
    let second_key = keys.iter().skip(1).find(|k| **k != keys[0]);

    let mut q = ProjectivePoint::IDENTITY;
    for key in keys {
        let point = lift_x(key)?;
        let coefficient = key_agg_coefficient(&list_hash, key, second_key.map(|k| &k[..]));
        q += point * coefficient;
    }
    if q == ProjectivePoint::IDENTITY {
        return Err(BitGoMusigError("aggregate key is infinity".to_string()));
    }

    let encoded = q.to_affine().to_encoded_point(true);
    let x = encoded
        .x()
        .ok_or_else(|| BitGoMusigError("aggregate key is infinity".to_string()))?;
    let mut out = [0u8; 32];
    out.copy_from_slice(x);
    Ok(out)
}

/// Internal key of a legacy `p2tr` output (chains 30/31).
///
/// Order of `keys` does not matter: they are made x-only and sorted first.
pub fn key_agg_bitgo_p2tr_legacy(keys: &[CompressedPublicKey]) -> Result<[u8; 32], BitGoMusigError> {
    let mut xonly: Vec<[u8; 32]> = keys
        .iter()
        .map(|k| {
            let mut x = [0u8; 32];
            x.copy_from_slice(&k.to_bytes()[1..]);
            x
        })
        .collect();
    xonly.sort();
    key_agg_xonly(&xonly)
}

/// Internal key of a `p2trMusig2` output (chains 40/41): BIP327 `KeyAgg`.
pub fn key_agg_p2tr_musig2(keys: &[CompressedPublicKey]) -> Result<[u8; 32], BitGoMusigError> {
    let points = keys
        .iter()
        .map(|k| {
            k256::PublicKey::from_sec1_bytes(&k.to_bytes())
                .map_err(|e| BitGoMusigError(format!("{}", e)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let ctx =
        musig2::KeyAggContext::new(points).map_err(|e| BitGoMusigError(format!("{}", e)))?;
    let aggregated: k256::PublicKey = ctx.aggregated_pubkey();
    let encoded = aggregated.to_encoded_point(true);
    let x = encoded
        .x()
        .ok_or_else(|| BitGoMusigError("aggregate key is infinity".to_string()))?;
    let mut out = [0u8; 32];
    out.copy_from_slice(x);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CompressedPublicKey {
        CompressedPublicKey::from_slice(&hex::decode(s).unwrap()).unwrap()
    }

    const USER: &str = "02d20a62701c54f6eb3abb9f964b0e29ff90ffa3b4e3fcb73e7c67d4950fa6e3c7";
    const BITGO: &str = "03203ab799ce28e2cca044f594c69275050af4bb0854ad730a8f74622342300e64";

    #[test]
    fn legacy_aggregation_ignores_order() {
        let expected = "cc899cac29f6243ef481be86f0d39e173c075cd57193d46332b1ec0b42c439aa";
        let a = key_agg_bitgo_p2tr_legacy(&[key(USER), key(BITGO)]).unwrap();
        let b = key_agg_bitgo_p2tr_legacy(&[key(BITGO), key(USER)]).unwrap();
        assert_eq!(hex::encode(a), expected);
        assert_eq!(a, b);
    }

    #[test]
    fn musig2_aggregation_depends_on_order() {
        let a = key_agg_p2tr_musig2(&[key(USER), key(BITGO)]).unwrap();
        let b = key_agg_p2tr_musig2(&[key(BITGO), key(USER)]).unwrap();
        assert_eq!(
            hex::encode(a),
            "c0e255b4510e041ab81151091d875687a618de314344dff4b73b1bcd366cdbd8"
        );
        assert_eq!(
            hex::encode(b),
            "e48d309b535811eb0b148c4b0600a10e82e289899429e40aee05577504eca356"
        );
    }
}
