//! Counting double behaviour
//!
//! The double must be usable as a functional port: ciphertexts open under the
//! matching key and are rejected under any other, and every call is counted.

use assert_matches::assert_matches;
use proptest::prelude::*;
use treekem_crypto::{CiphertextKind, CountingCrypto, CryptoError, CryptoPort, CryptoStats};

#[test]
fn test_pke_opens_only_under_matching_key() {
    let mut crypto = CountingCrypto::new(42);
    let alice = {
        let seed = crypto.random();
        crypto.pke_gen(&seed)
    };
    let bob = {
        let seed = crypto.random();
        crypto.pke_gen(&seed)
    };
    let message = crypto.random();

    let ciphertext = crypto.pke_enc(&alice.public, &message).unwrap();
    assert_eq!(ciphertext.kind, CiphertextKind::Pke);
    assert_eq!(crypto.pke_dec(&alice.secret, &ciphertext).unwrap(), message);
    assert_matches!(
        crypto.pke_dec(&bob.secret, &ciphertext),
        Err(CryptoError::KeyMismatch { .. })
    );
}

#[test]
fn test_ske_rejects_public_key_ciphertext() {
    let mut crypto = CountingCrypto::new(3);
    let seed = crypto.random();
    let key = crypto.ske_gen(&seed);
    let pair = crypto.pke_gen(&seed);
    let message = crypto.random();

    let sealed = crypto.ske_enc(&key, &message).unwrap();
    assert_eq!(crypto.ske_dec(&key, &sealed).unwrap(), message);

    let wrong = crypto.pke_enc(&pair.public, &message).unwrap();
    assert_matches!(
        crypto.ske_dec(&key, &wrong),
        Err(CryptoError::WrongKind {
            expected: CiphertextKind::Ske,
            actual: CiphertextKind::Pke
        })
    );
}

#[test]
fn test_prg_rejects_zero_outputs() {
    let mut crypto = CountingCrypto::new(0);
    let seed = crypto.random();
    assert_matches!(crypto.prg(&seed, 0), Err(CryptoError::InvalidPrgLength(0)));
    assert_eq!(crypto.stats().prg, 0);
}

#[test]
fn test_every_call_is_counted() {
    let mut crypto = CountingCrypto::new(9);
    let seed = crypto.random();
    let (next, secrets) = crypto.prg(&seed, 3).unwrap();
    let pair = crypto.pke_gen(&secrets[0]);
    let key = crypto.ske_gen(&secrets[1]);
    let pke = crypto.pke_enc(&pair.public, &next).unwrap();
    let ske = crypto.ske_enc(&key, &next).unwrap();
    crypto.pke_dec(&pair.secret, &pke).unwrap();
    crypto.ske_dec(&key, &ske).unwrap();

    assert_eq!(
        crypto.stats(),
        CryptoStats {
            random: 1,
            prg: 1,
            pke_gen: 1,
            pke_enc: 1,
            pke_dec: 1,
            ske_gen: 1,
            ske_enc: 1,
            ske_dec: 1,
        }
    );
    assert_eq!(crypto.stats().encryptions(), 2);

    let json = serde_json::to_value(crypto.stats()).unwrap();
    assert_eq!(json["pke_enc"], 1);
}

#[test]
fn test_secrets_never_print_their_bytes() {
    let mut crypto = CountingCrypto::new(5);
    let secret = crypto.random();
    let printed = format!("{secret:?}");
    assert!(printed.starts_with("Secret("));
    assert!(!printed.contains(&hex::encode(&secret.as_bytes()[..8])));
}

proptest! {
    /// Key generation is a function of the secret alone
    #[test]
    fn prop_pke_gen_is_deterministic(seed in any::<u64>()) {
        let mut first = CountingCrypto::new(seed);
        let mut second = CountingCrypto::new(seed.wrapping_add(1));
        let secret = first.random();
        prop_assert_eq!(first.pke_gen(&secret), second.pke_gen(&secret));
    }
}
