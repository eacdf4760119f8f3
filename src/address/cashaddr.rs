//! CashAddr encoding used by Bitcoin Cash and eCash.
//!
//! Only 160-bit payloads (p2pkh and p2sh) are supported.

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

const TYPE_P2PKH: u8 = 0;
const TYPE_P2SH: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashAddrType {
    P2pkh,
    P2sh,
}

fn polymod(values: &[u8]) -> u64 {
    let mut c: u64 = 1;
    for d in values {
        let c0 = (c >> 35) as u8;
        c = ((c & 0x07_ffff_ffff) << 5) ^ u64::from(*d);
        if c0 & 0x01 != 0 {
            c ^= 0x98_f2bc_8e61;
        }
        if c0 & 0x02 != 0 {
            c ^= 0x79_b76d_99e2;
        }
        if c0 & 0x04 != 0 {
            c ^= 0xf3_3e5f_b3c4;
        }
        if c0 & 0x08 != 0 {
            c ^= 0xae_2eab_e2a8;
        }
        if c0 & 0x10 != 0 {
            c ^= 0x1e_4f43_e470;
        }
    }
    c ^ 1
}

fn prefix_values(prefix: &str) -> Vec<u8> {
    let mut values: Vec<u8> = prefix.bytes().map(|b| b & 0x1f).collect();
    values.push(0);
    values
}

fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>, String> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max = (1u32 << to) - 1;
    let mut out = Vec::new();
    for value in data {
        let v = u32::from(*value);
        if v >> from != 0 {
            return Err("invalid value for bit conversion".to_string());
        }
        acc = (acc << from) | v;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max) as u8);
        }
    }
    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max) != 0 {
        return Err("invalid padding".to_string());
    }
    Ok(out)
}

pub fn encode(prefix: &str, addr_type: CashAddrType, hash: &[u8; 20]) -> Result<String, String> {
    let type_bits = match addr_type {
        CashAddrType::P2pkh => TYPE_P2PKH,
        CashAddrType::P2sh => TYPE_P2SH,
    };
    let mut raw = vec![type_bits << 3];
    raw.extend_from_slice(hash);
    let payload = convert_bits(&raw, 8, 5, true)?;

    let mut checksum_input = prefix_values(prefix);
    checksum_input.extend_from_slice(&payload);
    checksum_input.extend_from_slice(&[0u8; 8]);
    let checksum = polymod(&checksum_input);

    let mut out = String::with_capacity(prefix.len() + 1 + payload.len() + 8);
    out.push_str(prefix);
    out.push(':');
    for v in &payload {
        out.push(CHARSET[*v as usize] as char);
    }
    for i in 0..8 {
        let v = ((checksum >> (5 * (7 - i))) & 0x1f) as usize;
        out.push(CHARSET[v] as char);
    }
    Ok(out)
}

/// Decode a CashAddr string. The prefix may be omitted, in which case
/// `expected_prefix` is assumed.
pub fn decode(address: &str, expected_prefix: &str) -> Result<(CashAddrType, [u8; 20]), String> {
    let has_lower = address.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = address.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err("mixed case cashaddr".to_string());
    }
    let address = address.to_ascii_lowercase();
    let (prefix, body) = match address.split_once(':') {
        Some((p, b)) => (p.to_string(), b.to_string()),
        None => (expected_prefix.to_string(), address.clone()),
    };
    if prefix != expected_prefix {
        return Err(format!(
            "cashaddr prefix '{}' does not match '{}'",
            prefix, expected_prefix
        ));
    }

    let values = body
        .bytes()
        .map(|b| {
            CHARSET
                .iter()
                .position(|c| *c == b)
                .map(|p| p as u8)
                .ok_or_else(|| format!("invalid cashaddr character '{}'", b as char))
        })
        .collect::<Result<Vec<u8>, String>>()?;
    if values.len() < 8 {
        return Err("cashaddr too short".to_string());
    }

    let mut checksum_input = prefix_values(&prefix);
    checksum_input.extend_from_slice(&values);
    if polymod(&checksum_input) != 0 {
        return Err("invalid cashaddr checksum".to_string());
    }

    let payload = convert_bits(&values[..values.len() - 8], 5, 8, false)?;
    if payload.len() != 21 {
        return Err(format!("unsupported cashaddr payload length {}", payload.len()));
    }
    let addr_type = match payload[0] {
        v if v == TYPE_P2PKH << 3 => CashAddrType::P2pkh,
        v if v == TYPE_P2SH << 3 => CashAddrType::P2sh,
        v => return Err(format!("unsupported cashaddr version byte {}", v)),
    };
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    Ok((addr_type, hash))
}
