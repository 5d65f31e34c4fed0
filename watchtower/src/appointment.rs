//! The data the tower watches for and responds with.

use std::fmt;
use std::str::FromStr;

use bitcoin::{Transaction, Txid};
use bitcoin::hashes::Hash;
use bitcoin::hex::{DisplayHex, FromHex};
use bitcoin_ext::BlockHeight;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;


/// Identifier the tower assigns to every accepted appointment.
pub type AppointmentId = Uuid;

/// Length of a [Locator] in bytes.
pub const LOCATOR_LEN: usize = 16;

/// Short, public identifier derived from a dispute txid.
///
/// It's the first 16 bytes of the txid in its usual hex notation, so a client
/// can compute it from its channel state and the tower can match it against
/// any txid it sees in a block, without learning the full txid beforehand.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Locator([u8; LOCATOR_LEN]);

impl Locator {
	pub fn from_txid(txid: &Txid) -> Locator {
		let mut bytes = txid.to_byte_array();
		// txids are displayed in reverse byte order
		bytes.reverse();
		let mut ret = [0u8; LOCATOR_LEN];
		ret.copy_from_slice(&bytes[..LOCATOR_LEN]);
		Locator(ret)
	}

	pub fn from_bytes(bytes: [u8; LOCATOR_LEN]) -> Locator {
		Locator(bytes)
	}

	pub fn as_bytes(&self) -> &[u8; LOCATOR_LEN] {
		&self.0
	}
}

impl fmt::Display for Locator {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(&self.0.as_hex(), f)
	}
}

impl fmt::Debug for Locator {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

impl FromStr for Locator {
	type Err = bitcoin::hex::HexToArrayError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Locator(FromHex::from_hex(s)?))
	}
}

impl Serialize for Locator {
	fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
		s.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for Locator {
	fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
		let s = <std::borrow::Cow<'de, str>>::deserialize(d)?;
		Locator::from_str(&s).map_err(serde::de::Error::custom)
	}
}

/// A client's request to watch for a dispute and respond with a penalty.
///
/// Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
	pub locator: Locator,
	/// Last height at which the tower is obliged to watch.
	pub end_time: BlockHeight,
	/// Penalty transaction, encrypted with the dispute txid.
	#[serde(with = "crate::serde_util::hex")]
	pub encrypted_blob: Vec<u8>,
}

impl Appointment {
	/// The bytes the tower signs when it accepts this appointment.
	///
	/// Layout: `locator | encrypted_blob | end_time`, integers big endian.
	pub fn to_signing_bytes(&self) -> Vec<u8> {
		let mut buf = Vec::with_capacity(LOCATOR_LEN + self.encrypted_blob.len() + 4);
		buf.extend_from_slice(self.locator.as_bytes());
		buf.extend_from_slice(&self.encrypted_blob);
		buf.extend_from_slice(&self.end_time.to_be_bytes());
		buf
	}

	pub fn summary(&self) -> AppointmentSummary {
		AppointmentSummary {
			locator: self.locator,
			end_time: self.end_time,
		}
	}
}

/// What the Watcher keeps in memory per appointment.
///
/// The blob stays in the store and is only loaded on a locator match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentSummary {
	pub locator: Locator,
	pub end_time: BlockHeight,
}

/// The Responder's record of a breach it responded to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracker {
	pub locator: Locator,
	pub dispute_txid: Txid,
	pub penalty_txid: Txid,
	#[serde(with = "bitcoin_ext::serde::encodable")]
	pub penalty_tx: Transaction,
	/// The `end_time` of the appointment this tracker came from.
	pub appointment_end: BlockHeight,
}

impl Tracker {
	pub fn new(
		locator: Locator,
		dispute_txid: Txid,
		penalty_tx: Transaction,
		appointment_end: BlockHeight,
	) -> Tracker {
		Tracker {
			locator,
			dispute_txid,
			penalty_txid: penalty_tx.compute_txid(),
			penalty_tx,
			appointment_end,
		}
	}

	pub fn summary(&self) -> TrackerSummary {
		TrackerSummary {
			locator: self.locator,
			dispute_txid: self.dispute_txid,
			penalty_txid: self.penalty_txid,
			appointment_end: self.appointment_end,
		}
	}
}

/// A [Tracker] without the penalty transaction, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSummary {
	pub locator: Locator,
	pub dispute_txid: Txid,
	pub penalty_txid: Txid,
	pub appointment_end: BlockHeight,
}

/// Where an appointment currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
	/// The Watcher is still looking for the dispute.
	BeingWatched,
	/// The dispute was seen and the Responder is tracking the penalty.
	DisputeResponded,
	NotFound,
}

impl fmt::Display for AppointmentStatus {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			AppointmentStatus::BeingWatched => f.write_str("being_watched"),
			AppointmentStatus::DisputeResponded => f.write_str("dispute_responded"),
			AppointmentStatus::NotFound => f.write_str("not_found"),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn locator_is_txid_prefix() {
		let txid = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
			.parse::<Txid>().unwrap();
		let locator = Locator::from_txid(&txid);
		assert_eq!(locator.to_string(), "4a5e1e4baab89f3a32518a88c31bc87f");
		assert_eq!(locator.to_string().parse::<Locator>().unwrap(), locator);
		assert!("4a5e1e".parse::<Locator>().is_err());

		let json = serde_json::to_string(&locator).unwrap();
		assert_eq!(json, "\"4a5e1e4baab89f3a32518a88c31bc87f\"");
		assert_eq!(serde_json::from_str::<Locator>(&json).unwrap(), locator);
	}

	#[test]
	fn signing_bytes_layout() {
		let appointment = Appointment {
			locator: Locator::from_bytes([0xaa; 16]),
			end_time: 0x0102_0304,
			encrypted_blob: vec![0xde, 0xad],
		};
		let bytes = appointment.to_signing_bytes();
		assert_eq!(bytes.len(), 16 + 2 + 4);
		assert_eq!(&bytes[..16], &[0xaa; 16]);
		assert_eq!(&bytes[16..18], &[0xde, 0xad]);
		assert_eq!(&bytes[18..], &[1, 2, 3, 4]);
	}

	#[test]
	fn appointment_json() {
		let appointment = Appointment {
			locator: Locator::from_bytes([1; 16]),
			end_time: 120,
			encrypted_blob: vec![0xff, 0x00],
		};
		let json = serde_json::to_value(&appointment).unwrap();
		assert_eq!(json["encrypted_blob"], "ff00");
		assert_eq!(json["end_time"], 120);
		assert_eq!(serde_json::from_value::<Appointment>(json).unwrap(), appointment);
	}
}
