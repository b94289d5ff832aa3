//! Framing for opaque payloads: a 4-byte big-endian length followed by the
//! payload itself.

use crate::core::types::UserData;

use super::StorageError;

const HEADER_LEN: usize = 4;

pub fn encode(data: &UserData) -> Result<Vec<u8>, StorageError> {
    let payload = data.as_bytes();
    let len = u32::try_from(payload.len())
        .map_err(|_| StorageError::Corrupt("user data exceeds 4 GiB".to_string()))?;

    let mut framed = Vec::with_capacity(HEADER_LEN + payload.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(payload);
    Ok(framed)
}

pub fn decode(framed: &[u8]) -> Result<UserData, StorageError> {
    if framed.len() < HEADER_LEN {
        return Err(StorageError::Corrupt("truncated blob header".to_string()));
    }

    let (header, payload) = framed.split_at(HEADER_LEN);
    let mut len = [0u8; HEADER_LEN];
    len.copy_from_slice(header);
    let len = u32::from_be_bytes(len) as usize;

    if payload.len() != len {
        return Err(StorageError::Corrupt(format!(
            "blob declares {} bytes but holds {}",
            len,
            payload.len()
        )));
    }

    Ok(UserData::from_bytes(payload.to_vec()))
}

pub fn encode_opt(data: Option<&UserData>) -> Result<Option<Vec<u8>>, StorageError> {
    data.map(encode).transpose()
}

pub fn decode_opt(framed: Option<&[u8]>) -> Result<Option<UserData>, StorageError> {
    framed.map(decode).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_with_a_big_endian_length() {
        let framed = encode(&UserData::from_bytes(b"u42".to_vec())).unwrap();
        assert_eq!(framed, vec![0, 0, 0, 3, b'u', b'4', b'2']);
        assert_eq!(decode(&framed).unwrap().as_str(), Some("u42"));
    }

    #[test]
    fn empty_payload_is_valid() {
        let framed = encode(&UserData::from_bytes(Vec::new())).unwrap();
        assert_eq!(framed, vec![0, 0, 0, 0]);
        assert!(decode(&framed).unwrap().as_bytes().is_empty());
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(decode(&[0, 0]), Err(StorageError::Corrupt(_))));
        assert!(matches!(decode(&[0, 0, 0, 5, 1]), Err(StorageError::Corrupt(_))));
    }
}
