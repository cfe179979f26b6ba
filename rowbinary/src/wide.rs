use num_bigint::{BigInt, BigUint, Sign};

/// 128/256 位整数的二补码小端编解码。
///
/// RowBinary 的宽整数按声明位宽精确落盘, BigInt 只是运算载体,
/// 出入口都要求在位宽范围内。

/// 有符号二补码, 超出位宽返回 None
pub fn bigint_to_le_bytes(value: &BigInt, width_bytes: usize) -> Option<Vec<u8>> {
    let bits = (width_bytes * 8) as u32;
    let upper = BigInt::from(1) << (bits - 1);
    let lower = -upper.clone();
    if *value >= upper || *value < lower {
        return None;
    }

    let unsigned = if value.sign() == Sign::Minus {
        value + (BigInt::from(1) << bits)
    } else {
        value.clone()
    };
    let mut bytes = unsigned.to_biguint()?.to_bytes_le();
    bytes.resize(width_bytes, 0);
    Some(bytes)
}

pub fn bigint_from_le_bytes(bytes: &[u8]) -> BigInt {
    let unsigned = BigUint::from_bytes_le(bytes);
    let bits = (bytes.len() * 8) as u32;
    let sign_bit = bytes
        .last()
        .map(|b| b & 0x80 != 0)
        .unwrap_or(false);
    if sign_bit {
        BigInt::from(unsigned) - (BigInt::from(1) << bits)
    } else {
        BigInt::from(unsigned)
    }
}

/// 无符号, 超出位宽返回 None
pub fn biguint_to_le_bytes(value: &BigUint, width_bytes: usize) -> Option<Vec<u8>> {
    let mut bytes = value.to_bytes_le();
    if bytes.len() > width_bytes {
        return None;
    }
    bytes.resize(width_bytes, 0);
    Some(bytes)
}

pub fn biguint_from_le_bytes(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_le(bytes)
}
