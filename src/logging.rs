//! Helper macro keeping a `connection_id` field on every admission and queue log line.

/// Log an event about one client connection plus any extra fields.
#[macro_export]
macro_rules! gate_event {
    ($level:ident, $event:expr, connection_id = $connection:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            event = $event,
            connection_id = $connection,
            $($field = %$value,)*
        )
    };
}
