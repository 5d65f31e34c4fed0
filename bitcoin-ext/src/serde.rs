
pub mod encodable {
	//! Hex- or bytes-encode bitcoin objects using their consensus encoding.
	//!
	//! Human-readable formats like JSON get a hex string, binary formats get raw bytes.

	use std::borrow::Cow;

	use serde::{Deserialize, Deserializer, Serializer};

	use bitcoin::consensus::encode::{self, Decodable, Encodable};

	pub fn serialize<T, S>(v: &T, s: S) -> Result<S::Ok, S::Error>
	where
		T: Encodable,
		S: Serializer,
	{
		if s.is_human_readable() {
			s.serialize_str(&encode::serialize_hex(v))
		} else {
			s.serialize_bytes(&encode::serialize(v))
		}
	}

	pub fn deserialize<'d, T: Decodable, D: Deserializer<'d>>(d: D) -> Result<T, D::Error> {
		if d.is_human_readable() {
			let s = <Cow<'d, str>>::deserialize(d)?;
			encode::deserialize_hex(s.as_ref()).map_err(serde::de::Error::custom)
		} else {
			let b = <Cow<'d, [u8]>>::deserialize(d)?;
			encode::deserialize(b.as_ref()).map_err(serde::de::Error::custom)
		}
	}
}
