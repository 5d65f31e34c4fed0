#[macro_use] extern crate serde;

#[macro_use]
mod macros;
mod msgs;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

pub use crate::msgs::*;


/// The "target" field used for structured logging.
pub const SLOG_TARGET: &str = "watchtower-slog";

/// Name of the file structured logs are written to.
pub const SLOG_FILENAME: &str = "slog.log";

const SLOG_ID_FIELD: &str = "slog_id";
const SLOG_DATA_FIELD: &str = "slog_data";

/// Trait implemented by all our structured log messages.
pub trait LogMsg: Sized + Send + fmt::Debug + Serialize + DeserializeOwned + 'static {
	const LOGID: &'static str;
	const LEVEL: log::Level;
	const MSG: &'static str;
}

/// Emit a structured log message.
///
/// The message is attached to the record as two key-values, the log id and
/// the JSON-serialized message. Use the [slog] macro instead of calling this.
pub fn log<T: LogMsg>(msg: &T, module: &'static str, file: &'static str, line: u32) {
	let data = serde_json::to_string(msg)
		.unwrap_or_else(|e| format!("{{\"json_error\":\"{}\"}}", e));
	let kvs = [(SLOG_ID_FIELD, T::LOGID), (SLOG_DATA_FIELD, data.as_str())];
	log::logger().log(&log::Record::builder()
		.level(T::LEVEL)
		.target(SLOG_TARGET)
		.module_path_static(Some(module))
		.file_static(Some(file))
		.line(Some(line))
		.key_values(&kvs)
		.args(format_args!("{}", T::MSG))
		.build()
	);
}

/// A wrapper around a [log::Record] that serializes as one JSON log line.
pub struct RecordSerializeWrapper<'a>(pub &'a log::Record<'a>);

impl<'a> Serialize for RecordSerializeWrapper<'a> {
	fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
		let rec = self.0;
		let mut m = s.serialize_map(None)?;
		m.serialize_entry("timestamp", &chrono::Local::now())?;
		m.serialize_entry("message", &rec.args().to_string())?;
		m.serialize_entry("level", rec.level().as_str())?;
		m.serialize_entry("target", rec.target())?;
		if let Some(module) = rec.module_path() {
			m.serialize_entry("module", module)?;
		}
		if let Some(file) = rec.file() {
			m.serialize_entry("filename", file)?;
		}
		if let Some(line) = rec.line() {
			m.serialize_entry("line_number", &line)?;
		}
		let kv = rec.key_values();
		if let Some(id) = kv.get(SLOG_ID_FIELD.into()) {
			m.serialize_entry(SLOG_ID_FIELD, &id.to_string())?;
		}
		if let Some(data) = kv.get(SLOG_DATA_FIELD.into()) {
			m.serialize_entry("slog_data_json", &data.to_string())?;
		}
		m.end()
	}
}

#[derive(Debug)]
pub enum RecordParseError {
	WrongType,
	Json(serde_json::Error),
}

impl fmt::Display for RecordParseError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			RecordParseError::WrongType => f.write_str("log record is of a different type"),
			RecordParseError::Json(e) => write!(f, "invalid json in log record: {}", e),
		}
	}
}

impl std::error::Error for RecordParseError {}

pub fn parse_record(record: &str) -> Result<ParsedRecord<'_>, RecordParseError> {
	Ok(serde_json::from_str(record).map_err(RecordParseError::Json)?)
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ParsedRecord<'a> {
	pub timestamp: chrono::DateTime<chrono::Local>,
	#[serde(borrow)]
	pub message: Cow<'a, str>,
	#[serde(borrow)]
	pub level: Cow<'a, str>,
	pub target: Option<&'a str>,
	pub module: Option<&'a str>,
	pub filename: Option<&'a str>,
	pub line_number: Option<u32>,
	pub slog_id: Option<&'a str>,
	pub slog_data_json: Option<String>,
	#[serde(flatten)]
	pub extra: HashMap<String, serde_json::Value>,
}

impl ParsedRecord<'_> {
	/// Whether this is a structured log message
	pub fn is_slog(&self) -> bool {
		self.slog_id.is_some()
	}

	/// Check whether this log message if of the given structure log type.
	pub fn is<T: LogMsg>(&self) -> bool {
		self.slog_id == Some(T::LOGID)
	}

	/// Try to parse the log message into the given structured log type.
	pub fn try_as<T: LogMsg>(&self) -> Result<T, RecordParseError> {
		if !self.is::<T>() {
			return Err(RecordParseError::WrongType);
		}

		let json = self.slog_data_json.as_deref().unwrap_or("{}");
		Ok(serde_json::from_str(json).map_err(RecordParseError::Json)?)
	}
}


#[cfg(test)]
mod test {
	use super::*;

	use std::sync::Mutex;

	#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
	pub struct TestLog {
		pub nb: usize,
		pub name: String,
	}
	impl_slog!(TestLog, Info, "test log message");

	#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
	pub struct EmptyLog {}
	impl_slog!(EmptyLog, Debug, "empty log");

	#[test]
	fn test_log_msg_trait() {
		assert_eq!(TestLog::LOGID, "TestLog");
		assert_eq!(TestLog::LEVEL, log::Level::Info);
		assert_eq!(TestLog::MSG, "test log message");

		assert_eq!(EmptyLog::LOGID, "EmptyLog");
		assert_eq!(EmptyLog::LEVEL, log::Level::Debug);
	}

	#[test]
	fn json_parse() {
		let slog_data = serde_json::json!({
			"name": "test",
			"nb": 35
		});
		let json = serde_json::to_string(&serde_json::json!({
			"timestamp": "2025-09-01T17:06:57.586378832+01:00",
			"message": "test",
			"level": "INFO",
			"filename": "test.rs",
			"line_number": 35,
			"slog_id": "TestLog",
			"slog_data_json": slog_data.to_string(),
			"extra": {"extra": 3},
		})).unwrap();
		let parsed = parse_record(&json).unwrap();
		assert!(parsed.is_slog());
		assert!(parsed.is::<TestLog>());
		assert!(!parsed.is::<EmptyLog>());
		let tl = parsed.try_as::<TestLog>().unwrap();
		assert_eq!(tl, TestLog { nb: 35, name: "test".into() });
		assert!(matches!(parsed.try_as::<EmptyLog>(), Err(RecordParseError::WrongType)));

		// And without slog stuff
		let json = serde_json::to_string(&serde_json::json!({
			"timestamp": "2025-09-01T17:06:57.586378832+01:00",
			"message": "test",
			"level": "INFO",
		})).unwrap();
		let parsed = parse_record(&json).unwrap();
		assert!(!parsed.is_slog());
		assert!(!parsed.is::<TestLog>());
	}

	/// Logger that keeps every record it sees as a JSON line.
	struct CaptureLogger(Mutex<Vec<String>>);

	impl log::Log for CaptureLogger {
		fn enabled(&self, _: &log::Metadata) -> bool { true }
		fn log(&self, record: &log::Record) {
			let line = serde_json::to_string(&RecordSerializeWrapper(record)).unwrap();
			self.0.lock().unwrap().push(line);
		}
		fn flush(&self) {}
	}

	static LOGGER: CaptureLogger = CaptureLogger(Mutex::new(Vec::new()));

	#[test]
	fn slog_through_logger_and_back() {
		log::set_logger(&LOGGER).unwrap();
		log::set_max_level(log::LevelFilter::Trace);

		crate::log(&TestLog { nb: 7, name: "seven".into() }, module_path!(), "lib.rs", 1);

		let lines = LOGGER.0.lock().unwrap().clone();
		let line = lines.iter().find(|l| l.contains("TestLog")).expect("record logged");
		let parsed = parse_record(line).unwrap();
		assert_eq!(parsed.target, Some(SLOG_TARGET));
		assert_eq!(parsed.message, "test log message");
		assert_eq!(parsed.level, "INFO");
		assert_eq!(parsed.try_as::<TestLog>().unwrap(), TestLog { nb: 7, name: "seven".into() });
	}
}
