
use serde::{de, Deserialize, Deserializer, Serializer};

/// Bytes as a lowercase hex string.
pub mod hex {
	use super::*;

	use bitcoin::hex::{DisplayHex, FromHex};

	pub fn serialize<S: Serializer>(b: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
		s.collect_str(&b.as_hex())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
		let hex = <std::borrow::Cow<'de, str>>::deserialize(d)?;
		FromHex::from_hex(&hex).map_err(de::Error::custom)
	}
}

/// A [Duration](std::time::Duration) as a humantime string like "60s" or "1m 30s".
pub mod duration {
	use super::*;

	use std::time::Duration;

	pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.collect_str(&humantime::format_duration(*duration))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		let s = <std::borrow::Cow<'de, str>>::deserialize(d)?;
		humantime::parse_duration(&s).map_err(de::Error::custom)
	}
}

#[cfg(test)]
mod test {
	use std::time::Duration;

	use serde::{Deserialize, Serialize};

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Both {
		#[serde(with = "super::hex")]
		blob: Vec<u8>,
		#[serde(with = "super::duration")]
		interval: Duration,
	}

	#[test]
	fn hex_and_duration() {
		let json = r#"{"blob":"00ff10","interval":"1m 30s"}"#;
		let v = serde_json::from_str::<Both>(json).unwrap();
		assert_eq!(v, Both { blob: vec![0, 0xff, 0x10], interval: Duration::from_secs(90) });
		assert_eq!(serde_json::to_string(&v).unwrap(), json);

		assert!(serde_json::from_str::<Both>(r#"{"blob":"0","interval":"1s"}"#).is_err());
		assert!(serde_json::from_str::<Both>(r#"{"blob":"00","interval":"soon"}"#).is_err());
	}
}
