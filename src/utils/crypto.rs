// src/utils/crypto.rs

use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

pub struct CryptoUtils;

impl CryptoUtils {
    /// 生成随机邀请码，只在注册响应中出现一次
    pub fn generate_token() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect()
    }

    /// 邀请码入库前做 SHA-256，数据库里只有哈希
    pub fn hash_token(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token() {
        let a = CryptoUtils::generate_token();
        let b = CryptoUtils::generate_token();
        assert_eq!(a.len(), 48);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_token() {
        let hash = CryptoUtils::hash_token("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(CryptoUtils::hash_token("abd"), hash);
    }
}
