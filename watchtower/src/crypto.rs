//! Blob encryption and appointment signatures.
//!
//! A penalty is encrypted with ChaCha20-Poly1305 under `sha256(dispute_txid)`
//! with an all-zero nonce. The nonce can be constant because every key
//! encrypts exactly one message.

use bitcoin::{Transaction, Txid};
use bitcoin::consensus::encode;
use bitcoin::hashes::{sha256, Hash};
use bitcoin::secp256k1::{self, Message, PublicKey, SecretKey};
use bitcoin::sign_message::{signed_msg_hash, MessageSignature};
use bitcoin::hex::DisplayHex;
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use chacha20poly1305::aead::{Aead, KeyInit};

use crate::SECP;
use crate::appointment::Appointment;


#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecryptionError {
	/// Wrong key or tampered ciphertext.
	#[error("blob failed authentication")]
	Authentication,
	#[error("decrypted blob is not a valid transaction: {0}")]
	MalformedTransaction(String),
}

fn cipher_for(dispute_txid: &Txid) -> ChaCha20Poly1305 {
	let mut txid_bytes = dispute_txid.to_byte_array();
	txid_bytes.reverse();
	let key = sha256::Hash::hash(&txid_bytes);
	ChaCha20Poly1305::new(Key::from_slice(key.as_byte_array()))
}

/// Encrypt a penalty transaction for a given dispute txid.
pub fn encrypt(penalty_tx: &Transaction, dispute_txid: &Txid) -> Vec<u8> {
	let plaintext = encode::serialize(penalty_tx);
	cipher_for(dispute_txid)
		.encrypt(Nonce::from_slice(&[0u8; 12]), plaintext.as_slice())
		// chacha20poly1305 can only fail on plaintexts above 256 GiB
		.expect("plaintext fits")
}

/// Decrypt an appointment blob into the penalty transaction.
pub fn decrypt(blob: &[u8], dispute_txid: &Txid) -> Result<Transaction, DecryptionError> {
	let plaintext = cipher_for(dispute_txid)
		.decrypt(Nonce::from_slice(&[0u8; 12]), blob)
		.map_err(|_| DecryptionError::Authentication)?;
	encode::deserialize::<Transaction>(&plaintext)
		.map_err(|e| DecryptionError::MalformedTransaction(e.to_string()))
}

/// Digest of an encrypted blob, used to cache decryption results.
pub fn blob_digest(blob: &[u8]) -> sha256::Hash {
	sha256::Hash::hash(blob)
}

fn appointment_msg(appointment: &Appointment) -> Message {
	let hex = appointment.to_signing_bytes().to_lower_hex_string();
	Message::from_digest(signed_msg_hash(&hex).to_byte_array())
}

/// Sign an appointment with the tower key.
pub fn sign_appointment(appointment: &Appointment, key: &SecretKey) -> MessageSignature {
	let sig = SECP.sign_ecdsa_recoverable(&appointment_msg(appointment), key);
	MessageSignature::new(sig, true)
}

/// Recover the key that signed the appointment.
pub fn recover_signer(
	appointment: &Appointment,
	signature: &MessageSignature,
) -> Result<PublicKey, secp256k1::Error> {
	let sig = signature.signature.to_standard();
	let msg = appointment_msg(appointment);
	let pk = SECP.recover_ecdsa(&msg, &signature.signature)?;
	SECP.verify_ecdsa(&msg, &sig, &pk)?;
	Ok(pk)
}

#[cfg(test)]
mod test {
	use super::*;

	use crate::appointment::Locator;
	use crate::test_util::{dummy_tx, random_txid};

	#[test]
	fn decrypt_with_dispute_txid() {
		let dispute_txid = random_txid();
		let penalty = dummy_tx(7);
		let blob = encrypt(&penalty, &dispute_txid);

		assert_eq!(decrypt(&blob, &dispute_txid).unwrap(), penalty);
		// deterministic
		assert_eq!(decrypt(&blob, &dispute_txid), decrypt(&blob, &dispute_txid));
		assert_eq!(encrypt(&penalty, &dispute_txid), blob);
	}

	#[test]
	fn wrong_key_fails_authentication() {
		let blob = encrypt(&dummy_tx(1), &random_txid());
		for _ in 0..10 {
			assert_eq!(decrypt(&blob, &random_txid()), Err(DecryptionError::Authentication));
		}

		let mut tampered = blob.clone();
		tampered[0] ^= 1;
		assert!(decrypt(&tampered, &random_txid()).is_err());
	}

	#[test]
	fn garbage_plaintext_is_malformed() {
		let dispute_txid = random_txid();
		let blob = cipher_for(&dispute_txid)
			.encrypt(Nonce::from_slice(&[0u8; 12]), &b"not a transaction"[..])
			.unwrap();
		assert!(matches!(
			decrypt(&blob, &dispute_txid),
			Err(DecryptionError::MalformedTransaction(_)),
		));
	}

	#[test]
	fn signature_recovers_tower_key() {
		let key = SecretKey::new(&mut bitcoin::secp256k1::rand::thread_rng());
		let appointment = Appointment {
			locator: Locator::from_txid(&random_txid()),
			end_time: 500,
			encrypted_blob: vec![1, 2, 3],
		};
		let sig = sign_appointment(&appointment, &key);
		assert_eq!(recover_signer(&appointment, &sig).unwrap(), key.public_key(&SECP));

		let other = Appointment { end_time: 501, ..appointment };
		assert_ne!(recover_signer(&other, &sig).ok(), Some(key.public_key(&SECP)));
	}
}
