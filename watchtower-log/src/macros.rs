
/// Implement [LogMsg](crate::LogMsg) for a struct.
///
/// The struct name doubles as the log id.
#[macro_export]
macro_rules! impl_slog {
	($name:ident, $lvl:ident, $msg:expr $(,)?) => {
		impl $crate::LogMsg for $name {
			const LOGID: &'static str = stringify!($name);
			const LEVEL: log::Level = log::Level::$lvl;
			const MSG: &'static str = $msg;
		}
	};
}

#[macro_export]
macro_rules! filename {
	() => (file!().rsplit("watchtower/").next().unwrap_or(file!()))
}

/// Emit a structured log message.
///
/// ```ignore
/// slog!(AppointmentAccepted, uuid, locator: locator.to_string(), end_time, start_block);
/// ```
#[macro_export]
macro_rules! slog {
	($struct:ident) => {{
		if log::log_enabled!(target: $crate::SLOG_TARGET, <$crate::$struct as $crate::LogMsg>::LEVEL) {
			$crate::log(
				&$crate::$struct {},
				module_path!(),
				$crate::filename!(),
				line!(),
			);
		}
	}};
	($struct:ident, $( $args:tt )*) => {{
		if log::log_enabled!(target: $crate::SLOG_TARGET, <$crate::$struct as $crate::LogMsg>::LEVEL) {
			$crate::log(
				&$crate::$struct { $( $args )* },
				module_path!(),
				$crate::filename!(),
				line!(),
			);
		}
	}};
}
