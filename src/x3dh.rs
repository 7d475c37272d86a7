use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{
    Error, IdentityKey, IdentityKeyPair, PreKeyBundle, PreKeyRecord, SignedPreKeyRecord,
    X25519PublicKey, X25519Secret,
};

const SALT: &[u8] = b"Vesper-E2E-NaCl";

/// Initiator side of the X3DH agreement, run against a published bundle.
///
/// The caller supplies the ephemeral base key so its public half can be
/// embedded in the resulting pre-key message.
pub(crate) fn initiate(
    our_identity: &IdentityKeyPair,
    base_key: &X25519Secret,
    bundle: &PreKeyBundle,
    info: &[u8],
) -> Result<[u8; 32], Error> {
    // DH1 = DH(IKa, SPKb)
    let dh1 = our_identity.dh(&bundle.signed_pre_key());
    // DH2 = DH(EKa, IKb)
    let dh2 = base_key.dh(&bundle.identity().dh_key()).to_bytes();
    // DH3 = DH(EKa, SPKb)
    let dh3 = base_key.dh(&bundle.signed_pre_key()).to_bytes();
    // DH4 = DH(EKa, OPKb)
    let dh4 = bundle
        .pre_key()
        .map(|(_, pre_key)| base_key.dh(&pre_key).to_bytes());

    derive_master_secret(dh1, dh2, dh3, dh4, info)
}

/// Responder side, mirroring the initiator's computations from local
/// material named by the pre-key message.
pub(crate) fn respond(
    our_identity: &IdentityKeyPair,
    signed_pre_key: &SignedPreKeyRecord,
    one_time_pre_key: Option<&PreKeyRecord>,
    their_identity: &IdentityKey,
    their_base_key: &X25519PublicKey,
    info: &[u8],
) -> Result<[u8; 32], Error> {
    // DH1 = DH(SPKb, IKa)
    let dh1 = signed_pre_key.dh(&their_identity.dh_key());
    // DH2 = DH(IKb, EKa)
    let dh2 = our_identity.dh(their_base_key);
    // DH3 = DH(SPKb, EKa)
    let dh3 = signed_pre_key.dh(their_base_key);
    // DH4 = DH(OPKb, EKa)
    let dh4 = one_time_pre_key.map(|pre_key| pre_key.dh(their_base_key));

    derive_master_secret(dh1, dh2, dh3, dh4, info)
}

fn derive_master_secret(
    mut dh1: [u8; 32],
    mut dh2: [u8; 32],
    mut dh3: [u8; 32],
    mut dh4: Option<[u8; 32]>,
    info: &[u8],
) -> Result<[u8; 32], Error> {
    // IKM = DH1 || DH2 || DH3 || DH4 (if available)
    let mut key_material = Vec::with_capacity(128);
    key_material.extend_from_slice(&dh1);
    key_material.extend_from_slice(&dh2);
    key_material.extend_from_slice(&dh3);
    if let Some(dh4_bytes) = dh4 {
        key_material.extend_from_slice(&dh4_bytes);
    }

    dh1.zeroize();
    dh2.zeroize();
    dh3.zeroize();
    dh4.zeroize();

    let hkdf = Hkdf::<Sha256>::new(Some(SALT), &key_material);
    key_material.zeroize();

    let mut shared_secret = [0u8; 32];
    hkdf.expand(info, &mut shared_secret)
        .map_err(|_| Error::Crypto("HKDF expansion failed".to_string()))?;

    Ok(shared_secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_random_seed;

    fn bundle_for(
        identity: &IdentityKeyPair,
        signed_pre_key: &SignedPreKeyRecord,
        pre_key: Option<&PreKeyRecord>,
    ) -> PreKeyBundle {
        PreKeyBundle::new(1, identity.public(), signed_pre_key, pre_key)
    }

    #[test]
    fn test_agreement_with_one_time_pre_key() {
        let alice = IdentityKeyPair::generate().unwrap();
        let bob = IdentityKeyPair::generate().unwrap();
        let bob_spk = SignedPreKeyRecord::generate(1, &bob).unwrap();
        let bob_otpk = PreKeyRecord::generate(1).unwrap();

        let base_key = X25519Secret::from(generate_random_seed().unwrap());
        let bundle = bundle_for(&bob, &bob_spk, Some(&bob_otpk));

        let alice_secret = initiate(&alice, &base_key, &bundle, b"test-info").unwrap();
        let bob_secret = respond(
            &bob,
            &bob_spk,
            Some(&bob_otpk),
            &alice.public(),
            &base_key.public_key(),
            b"test-info",
        )
        .unwrap();

        assert_eq!(alice_secret, bob_secret);
    }

    #[test]
    fn test_agreement_without_one_time_pre_key() {
        let alice = IdentityKeyPair::generate().unwrap();
        let bob = IdentityKeyPair::generate().unwrap();
        let bob_spk = SignedPreKeyRecord::generate(1, &bob).unwrap();

        let base_key = X25519Secret::from(generate_random_seed().unwrap());
        let bundle = bundle_for(&bob, &bob_spk, None);

        let alice_secret = initiate(&alice, &base_key, &bundle, b"test-info").unwrap();
        let bob_secret = respond(
            &bob,
            &bob_spk,
            None,
            &alice.public(),
            &base_key.public_key(),
            b"test-info",
        )
        .unwrap();

        assert_eq!(alice_secret, bob_secret);
    }

    #[test]
    fn test_different_info_produces_different_secrets() {
        let alice = IdentityKeyPair::generate().unwrap();
        let bob = IdentityKeyPair::generate().unwrap();
        let bob_spk = SignedPreKeyRecord::generate(1, &bob).unwrap();

        let base_key = X25519Secret::from(generate_random_seed().unwrap());
        let bundle = bundle_for(&bob, &bob_spk, None);

        let secret_a = initiate(&alice, &base_key, &bundle, b"app-a").unwrap();
        let secret_b = initiate(&alice, &base_key, &bundle, b"app-b").unwrap();

        assert_ne!(secret_a, secret_b);
    }
}
