//! Registration of human-editable strings for later localization
//!
//! Fire-and-forget: sinks return nothing and callers never wait on them.

/// Receives `(name, value)` pairs such as `("Marker (ID 4) name", "Cafe")`.
pub trait TranslationSink: Send + Sync {
    fn register(&self, name: &str, value: &str);
}

/// Emits each registration as a debug event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTranslations;

impl TranslationSink for TracingTranslations {
    fn register(&self, name: &str, value: &str) {
        tracing::debug!(target: "mapsmarker::l10n", name, len = value.len(), "string registered");
    }
}

/// Discards registrations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTranslations;

impl TranslationSink for NoopTranslations {
    fn register(&self, _name: &str, _value: &str) {}
}

/// Register a map's editable strings.
pub fn register_map(sink: &dyn TranslationSink, id: i32, name: &str) {
    sink.register(&format!("Map (ID {id}) name"), name);
}

/// Register a marker's editable strings.
pub fn register_marker(sink: &dyn TranslationSink, id: i32, name: &str, address: &str, popup: &str) {
    sink.register(&format!("Marker (ID {id}) name"), name);
    sink.register(&format!("Marker (ID {id}) address"), address);
    sink.register(&format!("Marker (ID {id}) popup"), popup);
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Sink that keeps every registration.
    #[derive(Default)]
    pub(crate) struct RecordingTranslations(pub Mutex<Vec<(String, String)>>);

    impl TranslationSink for RecordingTranslations {
        fn register(&self, name: &str, value: &str) {
            self.0
                .lock()
                .expect("translations lock")
                .push((name.to_owned(), value.to_owned()));
        }
    }

    #[test]
    fn marker_keys() {
        let sink = RecordingTranslations::default();
        register_marker(&sink, 7, "Cafe", "Main St 1", "<b>Open</b>");

        let entries = sink.0.lock().unwrap();
        assert_eq!(
            *entries,
            vec![
                ("Marker (ID 7) name".to_owned(), "Cafe".to_owned()),
                ("Marker (ID 7) address".to_owned(), "Main St 1".to_owned()),
                ("Marker (ID 7) popup".to_owned(), "<b>Open</b>".to_owned()),
            ]
        );
    }

    #[test]
    fn map_key() {
        let sink = RecordingTranslations::default();
        register_map(&sink, 3, "City");
        assert_eq!(sink.0.lock().unwrap()[0].0, "Map (ID 3) name");
    }
}
